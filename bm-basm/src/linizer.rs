//! Line classification over BASM source.
//!
//! The linizer sits below the statement parser: it strips `;` comments,
//! skips blank lines and classifies everything that remains as a directive
//! (`%name body`), a label (`name:`) or an instruction (`name operand`). It
//! supports single-line lookahead, which is all the statement parser needs.

use crate::location::FileLocation;

/// The payload of one classified line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineValue {
    /// An instruction line: mnemonic plus the raw operand text.
    Instruction {
        /// The mnemonic.
        name: String,
        /// Everything after the mnemonic, untrimmed of expression structure.
        operand: String,
    },
    /// A label line (`name:`).
    Label {
        /// Text before the colon.
        name: String,
    },
    /// A directive line (`%name body`).
    Directive {
        /// The word right after `%`.
        name: String,
        /// The rest of the line.
        body: String,
    },
}

/// One classified source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// What the line is.
    pub value: LineValue,
    /// Where it is.
    pub location: FileLocation,
}

/// Streaming line classifier with single-line lookahead.
pub struct Linizer<'a> {
    lines: std::str::Lines<'a>,
    file_path: String,
    line_number: usize,
    peeked: Option<Line>,
}

impl<'a> Linizer<'a> {
    /// Classify `source`, reporting locations against `file_path`.
    pub fn new(source: &'a str, file_path: impl Into<String>) -> Self {
        Self {
            lines: source.lines(),
            file_path: file_path.into(),
            line_number: 0,
            peeked: None,
        }
    }

    /// The location of the line about to be produced (or just produced).
    pub fn location(&self) -> FileLocation {
        FileLocation::new(self.file_path.clone(), self.line_number)
    }

    /// Look at the next meaningful line without consuming it.
    pub fn peek(&mut self) -> Option<Line> {
        if self.peeked.is_none() {
            self.peeked = self.scan();
        }
        self.peeked.clone()
    }

    /// Consume and return the next meaningful line.
    pub fn next(&mut self) -> Option<Line> {
        self.peeked.take().or_else(|| self.scan())
    }

    fn scan(&mut self) -> Option<Line> {
        loop {
            let raw = self.lines.next()?;
            self.line_number += 1;

            // Everything from the comment symbol onward is discarded, even
            // inside string literals; a literal `;` needs the char syntax.
            let text = raw.split(';').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }

            let location = self.location();
            let value = if let Some(directive) = text.strip_prefix('%') {
                // The name ends at the first non-name character so that
                // macro calls can be written `%name(args)`.
                let split = directive
                    .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .unwrap_or(directive.len());
                LineValue::Directive {
                    name: directive[..split].to_owned(),
                    body: directive[split..].trim().to_owned(),
                }
            } else if text.ends_with(':') {
                let name = text.split(':').next().unwrap_or("").trim();
                LineValue::Label {
                    name: name.to_owned(),
                }
            } else {
                let (name, operand) = split_first_word(text);
                LineValue::Instruction {
                    name: name.to_owned(),
                    operand: operand.to_owned(),
                }
            };

            return Some(Line { value, location });
        }
    }
}

fn split_first_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim_start()),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linize(source: &str) -> Vec<Line> {
        let mut linizer = Linizer::new(source, "test.basm");
        let mut out = Vec::new();
        while let Some(line) = linizer.next() {
            out.push(line);
        }
        out
    }

    #[test]
    fn classifies_the_three_line_kinds() {
        let lines = linize("%const N = 2\nmain:\n    push N\n");
        assert_eq!(
            lines[0].value,
            LineValue::Directive {
                name: "const".to_owned(),
                body: "N = 2".to_owned(),
            }
        );
        assert_eq!(
            lines[1].value,
            LineValue::Label {
                name: "main".to_owned(),
            }
        );
        assert_eq!(
            lines[2].value,
            LineValue::Instruction {
                name: "push".to_owned(),
                operand: "N".to_owned(),
            }
        );
    }

    #[test]
    fn skips_blanks_and_strips_comments() {
        let lines = linize("\n; a file comment\n   halt ; stop here\n\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].value,
            LineValue::Instruction {
                name: "halt".to_owned(),
                operand: String::new(),
            }
        );
        assert_eq!(lines[0].location.line_number, 3);
    }

    #[test]
    fn macro_calls_split_before_the_paren() {
        let lines = linize("%square(i, 2)\n");
        assert_eq!(
            lines[0].value,
            LineValue::Directive {
                name: "square".to_owned(),
                body: "(i, 2)".to_owned(),
            }
        );
    }

    #[test]
    fn entry_with_colon_is_still_a_directive() {
        let lines = linize("%entry main:\n");
        assert_eq!(
            lines[0].value,
            LineValue::Directive {
                name: "entry".to_owned(),
                body: "main:".to_owned(),
            }
        );
    }

    #[test]
    fn instructions_without_operand() {
        let lines = linize("plusi\n");
        assert_eq!(
            lines[0].value,
            LineValue::Instruction {
                name: "plusi".to_owned(),
                operand: String::new(),
            }
        );
    }

    #[test]
    fn peek_is_stable_and_next_consumes() {
        let mut linizer = Linizer::new("halt\npush 1\n", "t.basm");
        assert_eq!(linizer.peek(), linizer.peek());
        let first = linizer.next().unwrap();
        assert_eq!(first.location.line_number, 1);
        let second = linizer.next().unwrap();
        assert_eq!(second.location.line_number, 2);
        assert!(linizer.next().is_none());
    }
}
