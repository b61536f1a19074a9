use core::fmt;

use crate::{inst_def, Opcode, Word};

/// A single instruction: an opcode paired with its operand word.
///
/// Opcodes without an operand still carry a (zero) operand word; the on-disk
/// encoding is a fixed 16-byte record either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inst {
    /// What to execute.
    pub opcode: Opcode,
    /// The immediate argument, meaningful only when the opcode takes one.
    pub operand: Word,
}

impl Inst {
    /// An instruction with an operand.
    pub fn new(opcode: Opcode, operand: impl Into<Word>) -> Self {
        Self {
            opcode,
            operand: operand.into(),
        }
    }

    /// An instruction whose opcode takes no operand.
    pub const fn plain(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: Word::ZERO,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if inst_def(self.opcode).has_operand {
            write!(f, "{} {}", self.opcode, self.operand)
        } else {
            write!(f, "{}", self.opcode)
        }
    }
}
