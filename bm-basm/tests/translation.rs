//! End-to-end scenarios: BASM source in, image out, machine runs it.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use bm_asm::{Opcode, Type};
use bm_basm::{verifier, Assembler, Assembly, CompileError, CompileErrorKind};
use bm_vm::{Image, Machine, NativeLibrary};

fn build(source: &str) -> Assembly {
    let mut assembler = Assembler::new();
    assembler
        .translate_root_source(source, "test.basm")
        .unwrap_or_else(|err| panic!("build failed:\n{err}"));
    assembler.into_assembly()
}

fn build_err(source: &str) -> CompileError {
    let mut assembler = Assembler::new();
    assembler
        .translate_root_source(source, "test.basm")
        .expect_err("build unexpectedly succeeded")
}

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_with_sink(image: &Image) -> (Machine, SharedSink) {
    let sink = SharedSink::default();
    let mut machine = Machine::from_image(image).unwrap();
    machine.link_natives(&NativeLibrary::standard()).unwrap();
    machine.set_sink(Box::new(sink.clone()));
    machine.run(-1).unwrap();
    (machine, sink)
}

#[test]
fn hello_world_emits_builds_and_runs() {
    let assembly = build(
        "%const HELLO = \"hi\\n\"\n\
         %entry main:\n\
         \tpush HELLO\n\
         \tpush 3\n\
         \tnative write\n\
         \thalt\n\
         %native write\n",
    );

    assert!(assembly.has_entry);
    assert_eq!(assembly.entry, 0, "entry points at the first instruction");
    assert_eq!(&assembly.memory[..3], b"hi\n");
    assert_eq!(assembly.externals, vec!["write".to_owned()]);

    let opcodes: Vec<Opcode> = assembly.program.iter().map(|inst| inst.opcode).collect();
    assert_eq!(
        opcodes,
        vec![Opcode::Push, Opcode::Push, Opcode::Native, Opcode::Halt]
    );
    assert_eq!(assembly.operand_types[0], Type::MemAddr);

    let (machine, sink) = run_with_sink(&assembly.to_image());
    assert!(machine.is_halted());
    assert_eq!(sink.contents(), b"hi\n");
}

#[test]
fn cyclic_consts_are_detected() {
    let err = build_err(
        "%const A = B\n\
         %const B = A\n\
         %entry main:\n\
         \tpush A\n\
         \thalt\n",
    );
    assert_eq!(err.location.line_number, 1, "A is entered first");
    assert!(matches!(
        err.kind,
        CompileErrorKind::CyclicBinding { name } if name == "A"
    ));
}

#[test]
fn for_depending_on_a_label_below_it_is_circular() {
    let err = build_err(
        "%for i from 0 to end_label\n\
         \tpush i\n\
         %end\n\
         end_label:\n\
         \thalt\n",
    );
    assert_eq!(err.location.line_number, 1);
    match err.kind {
        CompileErrorKind::AmbiguousLabel {
            construct,
            label,
            label_location,
        } => {
            assert_eq!(construct, "%for block");
            assert_eq!(label, "end_label");
            assert_eq!(label_location.line_number, 4);
        }
        other => panic!("unexpected error kind: {other}"),
    }
}

#[test]
fn if_depending_on_a_label_below_it_is_circular() {
    let err = build_err(
        "%if later == 2\n\
         \tnop\n\
         %end\n\
         later:\n\
         \thalt\n",
    );
    assert!(matches!(
        err.kind,
        CompileErrorKind::AmbiguousLabel { construct: "%if block", .. }
    ));
}

#[test]
fn every_directive_round_trips_through_the_image() {
    let source = "%const N = 2 + 3\n\
                  %const GREETING = \"hello, bm\\n\"\n\
                  %native write\n\
                  %entry main:\n\
                  %if N == 5\n\
                  \tpush GREETING\n\
                  \tpush len(GREETING)\n\
                  \tnative write\n\
                  %else\n\
                  %error \"unreachable\"\n\
                  %end\n\
                  %macro pushes(a, b)\n\
                  \tpush a\n\
                  \tpush b\n\
                  %end\n\
                  %pushes(1, 2)\n\
                  \tdrop\n\
                  \tdrop\n\
                  %scope\n\
                  %const LOCAL = 40\n\
                  \tpush LOCAL + 2\n\
                  \tdrop\n\
                  %end\n\
                  %for i from 1 to 3\n\
                  \tpush i\n\
                  \tdrop\n\
                  %end\n\
                  %assert len(GREETING) == 10\n\
                  \thalt\n";

    let assembly = build(source);
    let image = assembly.to_image();

    let bytes = image.to_bytes().unwrap();
    let decoded = Image::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, image, "decode(encode(image)) must be the identity");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.bm");
    image.save(&path).unwrap();
    assert_eq!(Image::load(&path).unwrap(), image);

    let (machine, sink) = run_with_sink(&image);
    assert!(machine.is_halted());
    assert_eq!(sink.contents(), b"hello, bm\n");
}

#[test]
fn redefinition_reports_the_first_binding() {
    let err = build_err(
        "%const X = 1\n\
         X:\n\
         \thalt\n",
    );
    assert_eq!(err.location.line_number, 2);
    match err.kind {
        CompileErrorKind::BindingRedefinition { name, first } => {
            assert_eq!(name, "X");
            assert_eq!(first.line_number, 1);
        }
        other => panic!("unexpected error kind: {other}"),
    }
}

#[test]
fn missing_entry_is_reported() {
    let err = build_err("main:\n\thalt\n");
    assert!(matches!(err.kind, CompileErrorKind::MissingEntry));
}

#[test]
fn second_entry_is_rejected() {
    let err = build_err(
        "%entry main:\n\
         \thalt\n\
         %entry main\n",
    );
    assert_eq!(err.location.line_number, 3);
    assert!(matches!(
        err.kind,
        CompileErrorKind::EntryAlreadySet { first } if first.line_number == 1
    ));
}

#[test]
fn entry_must_be_a_label() {
    let err = build_err(
        "%const X = 1\n\
         %entry X\n\
         \thalt\n",
    );
    assert!(matches!(
        err.kind,
        CompileErrorKind::EntryNotLabel(kind) if kind == bm_basm::BindingKind::Const
    ));
}

#[test]
fn asserts_may_reference_labels_defined_later() {
    let assembly = build(
        "%entry main:\n\
         \thalt\n\
         after:\n\
         %assert after == 1\n",
    );
    assert_eq!(assembly.program.len(), 1);
}

#[test]
fn failed_assert_stops_the_build() {
    let err = build_err(
        "%assert 1 == 2\n\
         %entry main:\n\
         \thalt\n",
    );
    assert_eq!(err.location.line_number, 1);
    assert!(matches!(err.kind, CompileErrorKind::AssertionFailed));
}

#[test]
fn explicit_error_directive_fires_during_the_first_pass() {
    let err = build_err(
        "%error \"custom failure\"\n\
         %entry main:\n\
         \thalt\n",
    );
    assert!(matches!(
        err.kind,
        CompileErrorKind::UserError(message) if message == "custom failure"
    ));
}

#[test]
fn macros_capture_their_definition_scope() {
    let assembly = build(
        "%const shift = 1\n\
         %macro shifted(x)\n\
         \tpush x + shift\n\
         %end\n\
         %entry main:\n\
         %scope\n\
         %const shift = 100\n\
         %shifted(2)\n\
         %end\n\
         \thalt\n",
    );

    // The call-site `shift = 100` must not be visible from the macro body:
    // its free name resolves against the definition scope, so 2 + 1, not
    // 2 + 100.
    assert_eq!(assembly.program[0].opcode, Opcode::Push);
    assert_eq!(assembly.program[0].operand.as_u64(), 3);
}

#[test]
fn macro_arity_is_checked_against_the_definition() {
    let err = build_err(
        "%macro inc(x)\n\
         \tpush x\n\
         %end\n\
         %inc(1, 2)\n\
         %entry main:\n\
         \thalt\n",
    );
    assert!(matches!(
        err.kind,
        CompileErrorKind::MacroArityMismatch {
            provided: 2,
            expected: 1,
            ..
        }
    ));
}

#[test]
fn unknown_macro_is_reported() {
    let err = build_err("%nope(1)\n%entry main:\n\thalt\n");
    assert!(matches!(
        err.kind,
        CompileErrorKind::UnknownMacro(name) if name == "nope"
    ));
}

#[test]
fn call_through_a_const_binding_is_rejected() {
    let err = build_err(
        "%const N = 1\n\
         %entry main:\n\
         \tcall N\n\
         \thalt\n",
    );
    assert_eq!(err.location.line_number, 3);
    assert!(matches!(
        err.kind,
        CompileErrorKind::CallTargetNotLabel { name, .. } if name == "N"
    ));
}

#[test]
fn native_operand_must_come_from_a_native_binding() {
    let err = build_err(
        "%const fake = 0\n\
         %entry main:\n\
         \tnative fake\n\
         \thalt\n",
    );
    assert!(matches!(
        err.kind,
        CompileErrorKind::NativeTargetNotNative(bm_basm::BindingKind::Const)
    ));
}

#[test]
fn byte_array_and_int32_reserve_memory_in_evaluation_order() {
    let assembly = build(
        "%const BUF = byte_array(4, 0xAB)\n\
         %const I = int32(0x11223344)\n\
         %entry main:\n\
         \tpush BUF\n\
         \tpush I\n\
         \tdrop\n\
         \tdrop\n\
         \thalt\n",
    );

    assert_eq!(assembly.program[0].operand.as_u64(), 0);
    assert_eq!(assembly.program[1].operand.as_u64(), 4);
    assert_eq!(&assembly.memory[..4], &[0xAB; 4]);
    assert_eq!(&assembly.memory[4..8], &[0x44, 0x33, 0x22, 0x11]);
}

#[test]
fn elif_chain_picks_the_matching_branch() {
    let assembly = build(
        "%const N = 2\n\
         %entry main:\n\
         %if N == 1\n\
         \tpush 1\n\
         %elif N == 2\n\
         \tpush 2\n\
         %else\n\
         \tpush 3\n\
         %end\n\
         \tdrop\n\
         \thalt\n",
    );
    assert_eq!(assembly.program[0].operand.as_u64(), 2);
    assert_eq!(assembly.program.len(), 3);
}

#[test]
fn for_repeats_its_body_with_the_loop_variable_bound() {
    let assembly = build(
        "%entry main:\n\
         %for i from 1 to 3\n\
         \tpush i\n\
         \tdrop\n\
         %end\n\
         \thalt\n",
    );
    let pushed: Vec<u64> = assembly
        .program
        .iter()
        .filter(|inst| inst.opcode == Opcode::Push)
        .map(|inst| inst.operand.as_u64())
        .collect();
    assert_eq!(pushed, vec![1, 2, 3]);
}

#[test]
fn const_division_by_zero_is_a_diagnostic() {
    let err = build_err(
        "%const X = 1 / 0\n\
         %entry main:\n\
         \tpush X\n\
         \thalt\n",
    );
    assert!(matches!(err.kind, CompileErrorKind::ConstDivByZero));
}

#[test]
fn includes_resolve_against_the_search_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lib.basm"),
        "%macro twice(x)\n\tpush x\n\tpush x\n%end\n",
    )
    .unwrap();

    let mut assembler = Assembler::new();
    assembler.push_include_path(dir.path());
    assembler
        .translate_root_source(
            "%include \"lib.basm\"\n\
             %entry main:\n\
             %twice(7)\n\
             \tdrop\n\
             \tdrop\n\
             \thalt\n",
            "main.basm",
        )
        .unwrap();

    let assembly = assembler.into_assembly();
    assert_eq!(assembly.program[0].operand.as_u64(), 7);
    assert_eq!(assembly.program[1].operand.as_u64(), 7);
}

#[test]
fn self_inclusion_exhausts_the_include_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.basm");
    std::fs::write(&path, format!("%include \"{}\"\n", path.display())).unwrap();

    let mut assembler = Assembler::new();
    let err = assembler.translate_root_file(&path).unwrap_err();
    assert!(matches!(
        err.kind,
        CompileErrorKind::IncludeDepthExceeded(_)
    ));
}

#[test]
fn file_interns_external_contents() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("blob.bin");
    std::fs::write(&data, b"\x01\x02\x03").unwrap();

    let assembly = build(&format!(
        "%const DATA = file(\"{}\")\n\
         %entry main:\n\
         \tpush DATA\n\
         \tpush len(DATA)\n\
         \tdrop\n\
         \tdrop\n\
         \thalt\n",
        data.display()
    ));
    assert_eq!(&assembly.memory[..3], &[1, 2, 3]);
    assert_eq!(assembly.program[1].operand.as_u64(), 3);
}

#[test]
fn symbol_table_lists_evaluated_bindings_with_types() {
    let mut assembler = Assembler::new();
    assembler
        .translate_root_source(
            "%const HELLO = \"hi\\n\"\n\
             %entry main:\n\
             \tpush HELLO\n\
             \tpush 3\n\
             \tnative write\n\
             \thalt\n\
             %native write\n",
            "test.basm",
        )
        .unwrap();

    let mut out = Vec::new();
    assembler.write_symbols(&mut out).unwrap();
    let symbols = String::from_utf8(out).unwrap();

    let inst_addr = Type::InstAddr as u8;
    let native_id = Type::NativeId as u8;
    let unsigned = Type::Unsigned as u8;
    assert!(symbols.contains(&format!("0\t{inst_addr}\tmain")));
    assert!(symbols.contains(&format!("0\t{native_id}\twrite")));
    assert!(symbols.contains(&format!("0\t{unsigned}\tHELLO")));
}

#[test]
fn verifier_accepts_a_well_typed_build() {
    let assembly = build(
        "%entry main:\n\
         \tpush 1\n\
         \tpush 2\n\
         \tdrop\n\
         \tdrop\n\
         \thalt\n",
    );
    verifier::verify(&assembly).unwrap();
}

#[test]
fn verifier_rejects_native_calls_as_unimplemented() {
    let assembly = build(
        "%const HELLO = \"hi\\n\"\n\
         %entry main:\n\
         \tpush HELLO\n\
         \tpush 3\n\
         \tnative write\n\
         \thalt\n\
         %native write\n",
    );
    assert!(matches!(
        verifier::verify(&assembly).unwrap_err().kind,
        CompileErrorKind::VerifyNotImplemented("native")
    ));
}
