//! BASM, the macro-assembler of the BM virtual machine.
//!
//! Source files go through three layers. The [`linizer`] classifies raw lines
//! as instructions, labels or directives; the [`statement`] parser turns them
//! into a block tree, using the [`expr`] parser (driven by the [`tokenizer`])
//! for everything operand-shaped; the [`Assembler`] lowers a block into a
//! program image in two passes per block, resolving bindings lazily and
//! queueing whatever depends on not-yet-known label addresses for the fix-up
//! sweeps that run after the whole program has been emitted.
//!
//! The [`verifier`] abstract-interprets the emitted program against the
//! per-opcode type signatures before the image is written.

#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod assembler;
mod error;
pub mod expr;
pub mod linizer;
mod location;
mod scope;
pub mod statement;
mod symtab;
pub mod tokenizer;
pub mod verifier;

pub use assembler::{Assembler, Assembly, MAX_INCLUDE_LEVEL};
pub use error::{CompileError, CompileErrorKind};
pub use location::FileLocation;
pub use scope::{Binding, BindingKind, BindingStatus};
