//! Type verification of emitted programs.
//!
//! A forward abstract interpretation from the entry point: instead of words,
//! the shadow stack holds `(type, origin)` frames, and every instruction is
//! checked against its signature before its outputs are pushed. The origin of
//! a frame is the instruction that pushed it, which is what makes the
//! mismatch diagnostics actionable.
//!
//! Control flow (`jmp`, `jmp_if`, `call`, `ret`) and `native` are not
//! covered: encountering one fails verification explicitly rather than
//! guessing at a join-over-paths analysis.

use bm_asm::{inst_def, Opcode, Type};
use bm_vm::consts::{PROGRAM_CAPACITY, STACK_CAPACITY};

use crate::assembler::Assembly;
use crate::error::{CompileError, CompileErrorKind};
use crate::location::FileLocation;

/// One abstract stack slot: a type and where it was pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The type of the value this slot would hold at run time.
    pub ty: Type,
    /// The instruction that pushed the slot.
    pub origin: FileLocation,
}

/// Verify the emitted program of `assembly` from its entry point.
pub fn verify(assembly: &Assembly) -> Result<(), CompileError> {
    let entry_location = assembly
        .entry_location
        .clone()
        .unwrap_or_else(|| FileLocation::whole_file("<program>"));

    if assembly.entry >= PROGRAM_CAPACITY as u64 {
        return Err(CompileError::new(
            entry_location,
            CompileErrorKind::EntryOutOfRange,
        ));
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut ip = assembly.entry;

    loop {
        let Some(inst) = assembly.program.get(ip as usize) else {
            return Err(CompileError::new(
                entry_location,
                CompileErrorKind::VerifyRanOffProgram,
            ));
        };
        let location = &assembly.locations[ip as usize];
        let def = inst_def(inst.opcode);

        match inst.opcode {
            Opcode::Halt => return Ok(()),

            Opcode::Nop => ip += 1,

            Opcode::Push => {
                push_frame(
                    &mut stack,
                    Frame {
                        ty: assembly.operand_types[ip as usize],
                        origin: location.clone(),
                    },
                    location,
                )?;
                ip += 1;
            }

            Opcode::Drop => {
                pop_frame(&mut stack, location)?;
                ip += 1;
            }

            Opcode::Dup => {
                let depth = inst.operand.as_u64() as usize;
                if depth >= stack.len() {
                    return Err(underflow(location));
                }
                let frame = stack[stack.len() - 1 - depth].clone();
                push_frame(&mut stack, frame, location)?;
                ip += 1;
            }

            Opcode::Swap => {
                let depth = inst.operand.as_u64() as usize;
                if depth >= stack.len() {
                    return Err(underflow(location));
                }
                let top = stack.len() - 1;
                stack.swap(top, top - depth);
                ip += 1;
            }

            Opcode::Jmp | Opcode::JmpIf | Opcode::Call | Opcode::Ret | Opcode::Native => {
                return Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::VerifyNotImplemented(def.mnemonic),
                ));
            }

            _ => {
                // Data opcodes are entirely signature-driven: pop the
                // declared inputs top-down, push the declared outputs.
                for expected in def.inputs.iter().rev() {
                    let frame = pop_frame(&mut stack, location)?;
                    if *expected != Type::Any && frame.ty != *expected {
                        return Err(CompileError::new(
                            location.clone(),
                            CompileErrorKind::TypeMismatch {
                                mnemonic: def.mnemonic,
                                expected: *expected,
                                actual: frame.ty,
                                origin: frame.origin,
                            },
                        ));
                    }
                }
                for output in def.outputs {
                    push_frame(
                        &mut stack,
                        Frame {
                            ty: *output,
                            origin: location.clone(),
                        },
                        location,
                    )?;
                }
                ip += 1;
            }
        }
    }
}

fn push_frame(
    stack: &mut Vec<Frame>,
    frame: Frame,
    location: &FileLocation,
) -> Result<(), CompileError> {
    if stack.len() >= STACK_CAPACITY {
        return Err(CompileError::new(
            location.clone(),
            CompileErrorKind::VerifyStackOverflow,
        ));
    }
    stack.push(frame);
    Ok(())
}

fn pop_frame(stack: &mut Vec<Frame>, location: &FileLocation) -> Result<Frame, CompileError> {
    stack.pop().ok_or_else(|| underflow(location))
}

fn underflow(location: &FileLocation) -> CompileError {
    CompileError::new(location.clone(), CompileErrorKind::VerifyStackUnderflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_asm::Inst;

    fn assembly(program: Vec<(Inst, Type)>) -> Assembly {
        let mut out = Assembly {
            has_entry: true,
            ..Assembly::default()
        };
        for (index, (inst, ty)) in program.into_iter().enumerate() {
            out.program.push(inst);
            out.operand_types.push(ty);
            out.locations
                .push(FileLocation::new("verify.basm", index + 1));
        }
        out
    }

    #[test]
    fn well_typed_arithmetic_passes() {
        let unit = assembly(vec![
            (Inst::new(Opcode::Push, 1u64), Type::Signed),
            (Inst::new(Opcode::Push, 2u64), Type::Signed),
            (Inst::plain(Opcode::Plusi), Type::Any),
            (Inst::plain(Opcode::Drop), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        verify(&unit).unwrap();
    }

    #[test]
    fn mismatch_names_the_origin_of_the_bad_frame() {
        // push 1.0 (float); push 1 (signed); plusi
        let unit = assembly(vec![
            (Inst::new(Opcode::Push, 1.0f64), Type::Float),
            (Inst::new(Opcode::Push, 1u64), Type::Signed),
            (Inst::plain(Opcode::Plusi), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);

        let err = verify(&unit).unwrap_err();
        assert_eq!(err.location.line_number, 3);
        match err.kind {
            CompileErrorKind::TypeMismatch {
                mnemonic,
                expected,
                actual,
                origin,
            } => {
                assert_eq!(mnemonic, "plusi");
                assert_eq!(expected, Type::Signed);
                assert_eq!(actual, Type::Float);
                assert_eq!(origin.line_number, 1, "the float was pushed on line 1");
            }
            other => panic!("unexpected error kind: {other}"),
        }
    }

    #[test]
    fn writes_accept_any_value_type() {
        let unit = assembly(vec![
            (Inst::new(Opcode::Push, 0u64), Type::MemAddr),
            (Inst::new(Opcode::Push, 1.5f64), Type::Float),
            (Inst::plain(Opcode::Write64), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        verify(&unit).unwrap();
    }

    #[test]
    fn write_address_must_be_a_mem_addr() {
        let unit = assembly(vec![
            (Inst::new(Opcode::Push, 0u64), Type::Unsigned),
            (Inst::new(Opcode::Push, 1u64), Type::Unsigned),
            (Inst::plain(Opcode::Write64), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        assert!(matches!(
            verify(&unit).unwrap_err().kind,
            CompileErrorKind::TypeMismatch {
                expected: Type::MemAddr,
                ..
            }
        ));
    }

    #[test]
    fn dup_copies_the_frame_with_its_origin() {
        let unit = assembly(vec![
            (Inst::new(Opcode::Push, 2u64), Type::Signed),
            (Inst::new(Opcode::Dup, 0u64), Type::StackAddr),
            (Inst::plain(Opcode::Plusi), Type::Any),
            (Inst::plain(Opcode::Drop), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        verify(&unit).unwrap();
    }

    #[test]
    fn underflow_is_reported_at_the_instruction() {
        let unit = assembly(vec![
            (Inst::plain(Opcode::Drop), Type::Any),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        let err = verify(&unit).unwrap_err();
        assert_eq!(err.location.line_number, 1);
        assert!(matches!(err.kind, CompileErrorKind::VerifyStackUnderflow));
    }

    #[test]
    fn control_flow_is_rejected_as_unimplemented() {
        let unit = assembly(vec![
            (Inst::new(Opcode::Jmp, 0u64), Type::InstAddr),
            (Inst::plain(Opcode::Halt), Type::Any),
        ]);
        assert!(matches!(
            verify(&unit).unwrap_err().kind,
            CompileErrorKind::VerifyNotImplemented("jmp")
        ));
    }

    #[test]
    fn running_off_the_program_is_an_error() {
        let unit = assembly(vec![(Inst::plain(Opcode::Nop), Type::Any)]);
        assert!(matches!(
            verify(&unit).unwrap_err().kind,
            CompileErrorKind::VerifyRanOffProgram
        ));
    }
}
