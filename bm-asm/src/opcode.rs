use core::fmt;

use strum::{EnumCount, IntoEnumIterator};

use crate::Type;

/// The closed set of instruction opcodes.
///
/// The discriminants are the on-disk encoding: an instruction record stores
/// the opcode as a little-endian `u64` holding exactly these values, so the
/// order of this enum is part of the binary format and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumCount,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u64)]
#[allow(missing_docs)]
pub enum Opcode {
    Nop = 0,
    Push,
    Drop,
    Dup,
    Swap,
    Plusi,
    Minusi,
    Multi,
    Divi,
    Modi,
    Multu,
    Divu,
    Modu,
    Plusf,
    Minusf,
    Multf,
    Divf,
    Jmp,
    JmpIf,
    Ret,
    Call,
    Native,
    Halt,
    Not,

    Eqi,
    Gei,
    Gti,
    Lei,
    Lti,
    Nei,

    Equ,
    Geu,
    Gtu,
    Leu,
    Ltu,
    Neu,

    Eqf,
    Gef,
    Gtf,
    Lef,
    Ltf,
    Nef,

    Andb,
    Orb,
    Xor,
    Shr,
    Shl,
    Notb,

    Read8u,
    Read16u,
    Read32u,
    Read64u,

    Read8i,
    Read16i,
    Read32i,
    Read64i,

    Write8,
    Write16,
    Write32,
    Write64,

    I2f,
    U2f,
    F2i,
    F2u,
}

impl Opcode {
    /// The assembler mnemonic of this opcode.
    pub fn mnemonic(self) -> &'static str {
        inst_def(self).mnemonic
    }

    /// Whether instructions with this opcode carry an operand.
    pub fn has_operand(self) -> bool {
        inst_def(self).has_operand
    }
}

impl TryFrom<u64> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|op| *op as u64 == value)
            .ok_or(InvalidOpcode(value))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// The `u64` does not encode any known opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcode(pub u64);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` does not encode a known opcode", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidOpcode {}

/// The static signature of an opcode.
///
/// The verifier is entirely data-driven off this descriptor: `inputs` are the
/// types popped from the abstract stack (listed bottom to top, so they are
/// checked in reverse) and `outputs` the types pushed back. The executor uses
/// `has_operand`/`operand_type` through the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstDef {
    /// The opcode this descriptor belongs to.
    pub opcode: Opcode,
    /// Assembler mnemonic.
    pub mnemonic: &'static str,
    /// Whether the instruction carries an operand word.
    pub has_operand: bool,
    /// Expected type of the operand, when there is one.
    pub operand_type: Type,
    /// Types consumed from the stack, bottom to top.
    pub inputs: &'static [Type],
    /// Types produced onto the stack, bottom to top.
    pub outputs: &'static [Type],
}

use Type::{Any, Bool, Float, InstAddr, MemAddr, NativeId, Signed, StackAddr, Unsigned};

const SIGNED_BIN: &[Type] = &[Signed, Signed];
const UNSIGNED_BIN: &[Type] = &[Unsigned, Unsigned];
const FLOAT_BIN: &[Type] = &[Float, Float];
const MEM_READ: &[Type] = &[MemAddr];
const MEM_WRITE: &[Type] = &[MemAddr, Any];

const fn def(
    opcode: Opcode,
    mnemonic: &'static str,
    operand: Option<Type>,
    inputs: &'static [Type],
    outputs: &'static [Type],
) -> InstDef {
    InstDef {
        opcode,
        mnemonic,
        has_operand: operand.is_some(),
        operand_type: match operand {
            Some(ty) => ty,
            None => Any,
        },
        inputs,
        outputs,
    }
}

static INST_DEFS: [InstDef; Opcode::COUNT] = [
    def(Opcode::Nop, "nop", None, &[], &[]),
    def(Opcode::Push, "push", Some(Any), &[], &[]),
    def(Opcode::Drop, "drop", None, &[Any], &[]),
    def(Opcode::Dup, "dup", Some(StackAddr), &[], &[]),
    def(Opcode::Swap, "swap", Some(StackAddr), &[], &[]),
    def(Opcode::Plusi, "plusi", None, SIGNED_BIN, &[Signed]),
    def(Opcode::Minusi, "minusi", None, SIGNED_BIN, &[Signed]),
    def(Opcode::Multi, "multi", None, SIGNED_BIN, &[Signed]),
    def(Opcode::Divi, "divi", None, SIGNED_BIN, &[Signed]),
    def(Opcode::Modi, "modi", None, SIGNED_BIN, &[Signed]),
    def(Opcode::Multu, "multu", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Divu, "divu", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Modu, "modu", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Plusf, "plusf", None, FLOAT_BIN, &[Float]),
    def(Opcode::Minusf, "minusf", None, FLOAT_BIN, &[Float]),
    def(Opcode::Multf, "multf", None, FLOAT_BIN, &[Float]),
    def(Opcode::Divf, "divf", None, FLOAT_BIN, &[Float]),
    def(Opcode::Jmp, "jmp", Some(InstAddr), &[], &[]),
    def(Opcode::JmpIf, "jmp_if", Some(InstAddr), &[Bool], &[]),
    def(Opcode::Ret, "ret", None, &[InstAddr], &[]),
    def(Opcode::Call, "call", Some(InstAddr), &[], &[InstAddr]),
    def(Opcode::Native, "native", Some(NativeId), &[], &[]),
    def(Opcode::Halt, "halt", None, &[], &[]),
    def(Opcode::Not, "not", None, &[Bool], &[Bool]),
    def(Opcode::Eqi, "eqi", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Gei, "gei", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Gti, "gti", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Lei, "lei", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Lti, "lti", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Nei, "nei", None, SIGNED_BIN, &[Bool]),
    def(Opcode::Equ, "equ", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Geu, "geu", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Gtu, "gtu", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Leu, "leu", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Ltu, "ltu", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Neu, "neu", None, UNSIGNED_BIN, &[Bool]),
    def(Opcode::Eqf, "eqf", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Gef, "gef", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Gtf, "gtf", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Lef, "lef", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Ltf, "ltf", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Nef, "nef", None, FLOAT_BIN, &[Bool]),
    def(Opcode::Andb, "andb", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Orb, "orb", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Xor, "xor", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Shr, "shr", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Shl, "shl", None, UNSIGNED_BIN, &[Unsigned]),
    def(Opcode::Notb, "notb", None, &[Unsigned], &[Unsigned]),
    def(Opcode::Read8u, "read8u", None, MEM_READ, &[Unsigned]),
    def(Opcode::Read16u, "read16u", None, MEM_READ, &[Unsigned]),
    def(Opcode::Read32u, "read32u", None, MEM_READ, &[Unsigned]),
    def(Opcode::Read64u, "read64u", None, MEM_READ, &[Unsigned]),
    def(Opcode::Read8i, "read8i", None, MEM_READ, &[Signed]),
    def(Opcode::Read16i, "read16i", None, MEM_READ, &[Signed]),
    def(Opcode::Read32i, "read32i", None, MEM_READ, &[Signed]),
    def(Opcode::Read64i, "read64i", None, MEM_READ, &[Signed]),
    def(Opcode::Write8, "write8", None, MEM_WRITE, &[]),
    def(Opcode::Write16, "write16", None, MEM_WRITE, &[]),
    def(Opcode::Write32, "write32", None, MEM_WRITE, &[]),
    def(Opcode::Write64, "write64", None, MEM_WRITE, &[]),
    def(Opcode::I2f, "i2f", None, &[Signed], &[Float]),
    def(Opcode::U2f, "u2f", None, &[Unsigned], &[Float]),
    def(Opcode::F2i, "f2i", None, &[Float], &[Signed]),
    def(Opcode::F2u, "f2u", None, &[Float], &[Unsigned]),
];

/// The static descriptor of `opcode`.
pub fn inst_def(opcode: Opcode) -> &'static InstDef {
    &INST_DEFS[opcode as usize]
}

/// Look an instruction descriptor up by its assembler mnemonic.
pub fn inst_by_name(mnemonic: &str) -> Option<&'static InstDef> {
    INST_DEFS.iter().find(|def| def.mnemonic == mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (index, def) in INST_DEFS.iter().enumerate() {
            assert_eq!(def.opcode as usize, index, "misplaced {}", def.mnemonic);
        }
    }

    #[test]
    fn mnemonic_round_trip() {
        for op in Opcode::iter() {
            let def = inst_by_name(op.mnemonic()).expect("mnemonic must resolve");
            assert_eq!(def.opcode, op);
        }
        assert!(inst_by_name("teleport").is_none());
    }

    #[test]
    fn u64_round_trip() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::try_from(op as u64), Ok(op));
        }
        assert_eq!(
            Opcode::try_from(Opcode::COUNT as u64),
            Err(InvalidOpcode(Opcode::COUNT as u64))
        );
    }

    #[test]
    fn signatures_are_at_most_binary() {
        for def in &INST_DEFS {
            assert!(def.inputs.len() <= 2);
            assert!(def.outputs.len() <= 1);
        }
    }

    #[test]
    fn operand_carriers() {
        for op in [
            Opcode::Push,
            Opcode::Dup,
            Opcode::Swap,
            Opcode::Jmp,
            Opcode::JmpIf,
            Opcode::Call,
            Opcode::Native,
        ] {
            assert!(op.has_operand(), "{op} must take an operand");
        }
        for op in [Opcode::Nop, Opcode::Plusi, Opcode::Halt, Opcode::Write64] {
            assert!(!op.has_operand(), "{op} must not take an operand");
        }
    }
}
