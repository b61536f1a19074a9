//! The `.bm` binary image.
//!
//! The one interface of this system that has to be bit-exact. A file is a
//! little-endian fixed layout:
//!
//! ```text
//! u32 magic        = 0xA4016D62
//! u16 version      = 8
//! u64 program_size
//! u64 entry
//! u64 memory_base
//! u64 memory_size
//! u64 memory_capacity
//! u64 externals_size
//! ```
//!
//! followed by `program_size` records of `{u64 opcode, u64 operand}`,
//! `memory_size` bytes of initial data memory and `externals_size` records of
//! [`NATIVE_NAME_CAPACITY`] zero-padded name bytes.

use std::fs;
use std::io;
use std::path::Path;

use bm_asm::{Inst, Opcode, Word};

use crate::consts::{
    EXTERNALS_CAPACITY, FILE_MAGIC, FILE_VERSION, MEMORY_CAPACITY, NATIVE_NAME_CAPACITY,
    PROGRAM_CAPACITY,
};

/// Size of the encoded header in bytes.
const HEADER_SIZE: usize = 4 + 2 + 6 * 8;

/// Size of one encoded instruction record in bytes.
const INST_SIZE: usize = 16;

/// A decoded program image.
///
/// This is what the assembler produces and what the machine loads: the
/// program, the initial data memory (`memory.len()` is the `memory_size` of
/// the header), the declared memory capacity, the entry address and the
/// external native names resolved at link time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Image {
    /// The instructions.
    pub program: Vec<Inst>,
    /// Address of the first instruction to execute.
    pub entry: u64,
    /// Offset at which the initial memory is loaded.
    pub memory_base: u64,
    /// Initial contents of the data memory.
    pub memory: Vec<u8>,
    /// Bytes of data memory the program declares it uses.
    pub memory_capacity: u64,
    /// Names of the native functions the program depends on, in id order.
    pub externals: Vec<String>,
}

/// Failures while encoding, decoding or linking an image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Underlying file I/O failed.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// The file does not start with the BM magic number.
    #[error("unexpected magic 0x{found:08X}, expected 0x{expected:08X}; not a BM file")]
    BadMagic {
        /// Magic found in the file.
        found: u32,
        /// The magic every BM file carries.
        expected: u32,
    },
    /// The file uses a binary layout revision this build does not support.
    #[error("unsupported BM file version {found}, expected version {expected}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u16,
        /// The supported version.
        expected: u16,
    },
    /// The program section exceeds the compiled-in capacity.
    #[error("program section of {size} instructions exceeds the capacity of {limit}")]
    ProgramTooBig {
        /// Declared instruction count.
        size: u64,
        /// Compiled-in program capacity.
        limit: usize,
    },
    /// The declared memory capacity exceeds the compiled-in limit.
    #[error("memory section wants {capacity} bytes but the capacity is {limit} bytes")]
    MemoryTooBig {
        /// Declared memory capacity.
        capacity: u64,
        /// Compiled-in memory limit.
        limit: usize,
    },
    /// `memory_size` is greater than the declared `memory_capacity`.
    #[error("memory size {size} is greater than declared memory capacity {capacity}")]
    MemorySizeExceedsCapacity {
        /// Bytes of initial memory.
        size: u64,
        /// Declared capacity.
        capacity: u64,
    },
    /// The initial memory does not fit above `memory_base`.
    #[error("memory base {base} plus size {size} does not fit into capacity {capacity}")]
    MemoryBaseOutOfRange {
        /// Declared base offset.
        base: u64,
        /// Bytes of initial memory.
        size: u64,
        /// Declared capacity.
        capacity: u64,
    },
    /// The externals section exceeds the compiled-in capacity.
    #[error("externals section of {count} names exceeds the capacity of {limit}")]
    TooManyExternals {
        /// Declared record count.
        count: u64,
        /// Compiled-in externals capacity.
        limit: usize,
    },
    /// An instruction record does not encode a known opcode.
    #[error("instruction {index} holds unknown opcode encoding {encoding}")]
    UnknownOpcode {
        /// Raw opcode value.
        encoding: u64,
        /// Index of the offending instruction.
        index: usize,
    },
    /// The file ended before all declared sections were read.
    #[error("file is truncated")]
    Truncated,
    /// A native name record is not valid UTF-8.
    #[error("external native name {index} is not valid UTF-8")]
    InvalidNativeName {
        /// Index of the offending record.
        index: usize,
    },
    /// A native name does not fit into its fixed-size record.
    #[error("native function name `{name}` exceeds {limit} bytes")]
    NativeNameTooLong {
        /// The offending name.
        name: String,
        /// Maximum name length, excluding the terminating zero.
        limit: usize,
    },
    /// An external name could not be resolved while linking natives.
    #[error("unresolved native function `{name}`")]
    UnresolvedNative {
        /// The name no library entry matched.
        name: String,
    },
}

impl Image {
    /// Encode the image into the on-disk byte layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LoadError> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + self.program.len() * INST_SIZE
                + self.memory.len()
                + self.externals.len() * NATIVE_NAME_CAPACITY,
        );

        out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
        out.extend_from_slice(&FILE_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.program.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&self.memory_base.to_le_bytes());
        out.extend_from_slice(&(self.memory.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.memory_capacity.to_le_bytes());
        out.extend_from_slice(&(self.externals.len() as u64).to_le_bytes());

        for inst in &self.program {
            out.extend_from_slice(&(inst.opcode as u64).to_le_bytes());
            out.extend_from_slice(&inst.operand.to_le_bytes());
        }

        out.extend_from_slice(&self.memory);

        for name in &self.externals {
            if name.len() >= NATIVE_NAME_CAPACITY {
                return Err(LoadError::NativeNameTooLong {
                    name: name.clone(),
                    limit: NATIVE_NAME_CAPACITY - 1,
                });
            }
            let mut record = [0u8; NATIVE_NAME_CAPACITY];
            record[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&record);
        }

        Ok(out)
    }

    /// Decode and validate an image from its on-disk byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut reader = Reader { bytes };

        let magic = reader.u32()?;
        if magic != FILE_MAGIC {
            return Err(LoadError::BadMagic {
                found: magic,
                expected: FILE_MAGIC,
            });
        }

        let version = reader.u16()?;
        if version != FILE_VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: version,
                expected: FILE_VERSION,
            });
        }

        let program_size = reader.u64()?;
        let entry = reader.u64()?;
        let memory_base = reader.u64()?;
        let memory_size = reader.u64()?;
        let memory_capacity = reader.u64()?;
        let externals_size = reader.u64()?;

        if program_size > PROGRAM_CAPACITY as u64 {
            return Err(LoadError::ProgramTooBig {
                size: program_size,
                limit: PROGRAM_CAPACITY,
            });
        }
        if memory_capacity > MEMORY_CAPACITY as u64 {
            return Err(LoadError::MemoryTooBig {
                capacity: memory_capacity,
                limit: MEMORY_CAPACITY,
            });
        }
        if memory_size > memory_capacity {
            return Err(LoadError::MemorySizeExceedsCapacity {
                size: memory_size,
                capacity: memory_capacity,
            });
        }
        if memory_base.checked_add(memory_size).is_none()
            || memory_base + memory_size > memory_capacity
        {
            return Err(LoadError::MemoryBaseOutOfRange {
                base: memory_base,
                size: memory_size,
                capacity: memory_capacity,
            });
        }
        if externals_size > EXTERNALS_CAPACITY as u64 {
            return Err(LoadError::TooManyExternals {
                count: externals_size,
                limit: EXTERNALS_CAPACITY,
            });
        }

        let mut program = Vec::with_capacity(program_size as usize);
        for index in 0..program_size as usize {
            let encoding = reader.u64()?;
            let operand = Word::from_le_bytes(reader.array()?);
            let opcode = Opcode::try_from(encoding)
                .map_err(|_| LoadError::UnknownOpcode { encoding, index })?;
            program.push(Inst { opcode, operand });
        }

        let memory = reader.take(memory_size as usize)?.to_vec();

        let mut externals = Vec::with_capacity(externals_size as usize);
        for index in 0..externals_size as usize {
            let record = reader.take(NATIVE_NAME_CAPACITY)?;
            let len = record.iter().position(|b| *b == 0).unwrap_or(record.len());
            let name = std::str::from_utf8(&record[..len])
                .map_err(|_| LoadError::InvalidNativeName { index })?;
            externals.push(name.to_owned());
        }

        Ok(Self {
            program,
            entry,
            memory_base,
            memory,
            memory_capacity,
            externals,
        })
    }

    /// Write the image to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()?)?;
        tracing::debug!(path = %path.display(), instructions = self.program.len(), "saved image");
        Ok(())
    }

    /// Read and validate an image from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let image = Self::from_bytes(&fs::read(path)?)?;
        tracing::debug!(
            path = %path.display(),
            instructions = image.program.len(),
            memory = image.memory.len(),
            externals = image.externals.len(),
            "loaded image"
        );
        Ok(image)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        if self.bytes.len() < n {
            return Err(LoadError::Truncated);
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, LoadError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}
