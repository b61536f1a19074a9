//! Atomic types of the BM virtual machine.
//!
//! This crate defines the building blocks shared by the executor, the
//! assembler and the verifier: the 64-bit [`Word`] value unit, the [`Type`]
//! lattice used for bytecode verification, the closed [`Opcode`] set with its
//! per-opcode [`InstDef`] signatures, the [`Inst`] pair that programs are made
//! of, and the runtime [`Fault`] kinds.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod fault;
mod instruction;
mod opcode;
mod types;
mod word;

pub use fault::Fault;
pub use instruction::Inst;
pub use opcode::{inst_by_name, inst_def, InstDef, InvalidOpcode, Opcode};
pub use types::Type;
pub use word::Word;

/// An instruction address inside a program.
pub type InstAddr = u64;

/// A byte address inside the data memory.
pub type MemoryAddr = u64;

/// An offset from the top of the operand stack.
pub type StackAddr = u64;

/// An index into the native function table.
pub type NativeId = u64;
