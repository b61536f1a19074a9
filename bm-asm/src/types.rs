use core::fmt;

use strum::IntoEnumIterator;

/// Value types tracked by the bytecode verifier.
///
/// The types form a lattice rooted at [`Type::Any`]:
///
/// ```text
/// Any ─┬─ Float
///      ├─ Bool
///      └─ Integer ─┬─ Signed
///                  └─ Unsigned ─┬─ MemAddr
///                               ├─ InstAddr
///                               ├─ StackAddr
///                               └─ NativeId
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumCount)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Type {
    /// The root of the lattice; every value is an `Any`.
    Any = 0,
    /// IEEE-754 binary64.
    Float,
    /// Either of the integer interpretations.
    Integer,
    /// Signed 64-bit integer.
    Signed,
    /// Unsigned 64-bit integer.
    Unsigned,
    /// A byte address inside the data memory.
    MemAddr,
    /// An instruction address inside the program.
    InstAddr,
    /// An offset from the top of the operand stack.
    StackAddr,
    /// An index into the native function table.
    NativeId,
    /// A logical truth value, stored as 0 or 1.
    Bool,
}

impl Type {
    /// Human-readable name, as it appears in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Float => "Float",
            Self::Integer => "Integer",
            Self::Signed => "Signed",
            Self::Unsigned => "Unsigned",
            Self::MemAddr => "Mem_Addr",
            Self::InstAddr => "Inst_Addr",
            Self::StackAddr => "Stack_Addr",
            Self::NativeId => "Native_ID",
            Self::Bool => "Bool",
        }
    }

    /// Look a type up by its diagnostic name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::iter().find(|ty| ty.name() == name)
    }

    /// The immediate parent in the lattice. `Any` is its own supertype.
    pub const fn supertype(self) -> Self {
        match self {
            Self::Any | Self::Float | Self::Integer | Self::Bool => Self::Any,
            Self::Signed | Self::Unsigned => Self::Integer,
            Self::MemAddr | Self::InstAddr | Self::StackAddr | Self::NativeId => {
                Self::Unsigned
            }
        }
    }

    /// Whether `self` is `other` or lies below it in the lattice.
    pub fn is_subtype_of(self, other: Self) -> bool {
        let mut ty = self;
        loop {
            if ty == other {
                return true;
            }
            if ty == Self::Any {
                return false;
            }
            ty = ty.supertype();
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
