use core::fmt;

/// The 64-bit value unit of the machine.
///
/// A `Word` is eight raw bytes. The same bit pattern can be read back as an
/// unsigned integer, a signed integer or an IEEE-754 binary64 without any
/// conversion taking place; each opcode decides which interpretation it
/// operates under. Equality and hashing are defined on the raw bits, so two
/// `NaN` words with the same payload compare equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Word(u64);

impl Word {
    /// Size of a word in bytes.
    pub const SIZE: usize = 8;

    /// A word with all bits clear.
    pub const ZERO: Self = Self(0);

    /// Reinterpret the bits as an unsigned 64-bit integer.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reinterpret the bits as a signed 64-bit integer.
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Reinterpret the bits as an IEEE-754 binary64 value.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// The word encoded as little-endian bytes, matching the on-disk layout.
    pub const fn to_le_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }

    /// Decode a word from little-endian bytes.
    pub const fn from_le_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<i64> for Word {
    fn from(value: i64) -> Self {
        Self(value as u64)
    }
}

impl From<f64> for Word {
    fn from(value: f64) -> Self {
        Self(value.to_bits())
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
