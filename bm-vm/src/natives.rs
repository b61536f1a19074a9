//! Native functions and the library they are resolved from.
//!
//! A native is a host function invoked by the `native` instruction. By
//! convention it consumes its arguments from the top of the operand stack and
//! pushes its result; validating stack depth and memory ranges is the
//! native's own responsibility.

use std::collections::HashMap;

use bm_asm::Fault;

use crate::machine::Machine;

/// A host function callable from bytecode.
///
/// Plain function pointers keep the table `Copy`, so dispatch can lift the
/// pointer out of the machine before re-borrowing it mutably.
pub type NativeFn = fn(&mut Machine) -> Result<(), Fault>;

/// Name-to-function table used to resolve the external names of an image.
#[derive(Clone, Default)]
pub struct NativeLibrary {
    entries: HashMap<String, NativeFn>,
}

impl NativeLibrary {
    /// A library with no entries at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard library: just the built-in `write`.
    pub fn standard() -> Self {
        let mut library = Self::empty();
        library.register("write", native_write);
        library
    }

    /// Add or replace an entry.
    pub fn register(&mut self, name: impl Into<String>, native: NativeFn) {
        self.entries.insert(name.into(), native);
    }

    /// Look a native up by its external name.
    pub fn resolve(&self, name: &str) -> Option<NativeFn> {
        self.entries.get(name).copied()
    }
}

/// The built-in `write` native: pops a byte count, then an address, and
/// streams `memory[addr..addr + count]` to the machine's sink.
pub fn native_write(machine: &mut Machine) -> Result<(), Fault> {
    let count = machine.peek(0)?.as_u64();
    let addr = machine.peek(1)?.as_u64();

    machine.write_to_sink(addr, count)?;

    machine.pop()?;
    machine.pop()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_library_resolves_write() {
        let library = NativeLibrary::standard();
        assert!(library.resolve("write").is_some());
        assert!(library.resolve("read").is_none());
    }

    #[test]
    fn write_requires_two_stack_slots() {
        let mut machine = Machine::new();
        assert_eq!(native_write(&mut machine), Err(Fault::StackUnderflow));
    }

    #[test]
    fn write_rejects_out_of_range_spans() {
        use crate::consts::MEMORY_CAPACITY;
        let mut machine = Machine::new();
        machine.push((MEMORY_CAPACITY as u64).into()).unwrap();
        machine.push(1u64.into()).unwrap();
        assert_eq!(native_write(&mut machine), Err(Fault::IllegalMemoryAccess));
        assert_eq!(machine.stack().len(), 2, "a failed native must not pop");
    }
}
