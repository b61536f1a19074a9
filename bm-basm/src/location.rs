use std::fmt;

/// A position in BASM source, precise to the line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocation {
    /// Path of the source file, as it was given to the assembler.
    pub file_path: String,
    /// 1-based line number; 0 when the location refers to the file as a
    /// whole.
    pub line_number: usize,
}

impl FileLocation {
    /// A location on a concrete line.
    pub fn new(file_path: impl Into<String>, line_number: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
        }
    }

    /// A location referring to a file as a whole.
    pub fn whole_file(file_path: impl Into<String>) -> Self {
        Self::new(file_path, 0)
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.line_number)
    }
}
