//! The symbol-table side file.
//!
//! Written next to an image for the debugger: one line per evaluated
//! binding, `<address>\t<type-index>\t<name>`. Labels carry the instruction
//! address type; consts are reported under the numeric supertype of whatever
//! their expression evaluated to, so a string const shows up as plain
//! `Unsigned` rather than the internal address leaf.

use std::io::{self, Write};
use std::path::Path;

use bm_asm::Type;

use crate::assembler::Assembler;
use crate::scope::{BindingKind, BindingStatus};

/// Collapse the address leaves into their numeric supertype for reporting.
fn numeric_supertype(ty: Type) -> Type {
    match ty {
        Type::MemAddr | Type::StackAddr | Type::NativeId => Type::Unsigned,
        other => other,
    }
}

impl Assembler {
    /// Write the symbol table of every evaluated binding to `path`.
    ///
    /// Bindings that were never evaluated (unreferenced consts) have no
    /// value to report and are skipped.
    pub fn save_symbols(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut out = Vec::new();
        self.write_symbols(&mut out)?;
        std::fs::write(path, out)
    }

    /// Write the symbol table to an arbitrary sink.
    pub fn write_symbols(&self, out: &mut impl Write) -> io::Result<()> {
        for binding in self.scopes.all_bindings() {
            if binding.status != BindingStatus::Evaluated {
                continue;
            }
            let ty = match binding.kind {
                BindingKind::Label => Type::InstAddr,
                BindingKind::Native => Type::NativeId,
                BindingKind::Const => numeric_supertype(binding.ty),
            };
            writeln!(
                out,
                "{}\t{}\t{}",
                binding.value.as_u64(),
                ty as u8,
                binding.name
            )?;
        }
        Ok(())
    }
}
