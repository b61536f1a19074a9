//! The BM virtual machine.
//!
//! A [`Machine`] executes a program of stack instructions against a linear
//! data memory and a table of native functions. Programs arrive either as an
//! in-memory [`Image`] (straight from the assembler) or as a `.bm` file in
//! the fixed binary layout described in [`image`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod consts;
pub mod image;
pub mod machine;
pub mod natives;

pub use image::{Image, LoadError};
pub use machine::Machine;
pub use natives::{NativeFn, NativeLibrary};

#[doc(no_inline)]
pub use bm_asm::{Fault, Inst, Opcode, Word};
