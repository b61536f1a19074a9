use core::fmt;

/// Failure kinds of the executor.
///
/// A fault stops the machine without modifying its state; the embedder
/// decides whether to dump the stack, print the offending instruction or
/// terminate. Natives report through the same kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fault {
    /// A push would exceed the stack capacity.
    StackOverflow,
    /// A pop found fewer elements than the instruction consumes.
    StackUnderflow,
    /// The program contains an opcode the machine does not know.
    IllegalInst,
    /// The instruction pointer left the program (`ip >= program_size`).
    IllegalInstAccess,
    /// The operand is out of range for the instruction, e.g. a `native` id
    /// past the end of the native table.
    IllegalOperand,
    /// A typed read or write touched bytes outside the data memory.
    IllegalMemoryAccess,
    /// Integer division or remainder by zero.
    DivByZero,
    /// A `native` instruction hit an unpopulated table slot.
    NullNative,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Fault {}
