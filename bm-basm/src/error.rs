use std::fmt;
use std::io;
use std::path::PathBuf;

use bm_asm::Type;

use crate::location::FileLocation;
use crate::scope::BindingKind;
use crate::tokenizer::TokenKind;

/// A fatal build-time diagnostic.
///
/// Every translator, parser and verifier failure carries the primary source
/// location it should be reported at; some kinds also carry a secondary
/// location (first definition, origin of a stack frame) which `Display`
/// renders as a `NOTE:` line, the shape an editor can jump through.
#[derive(Debug)]
pub struct CompileError {
    /// Where the problem is.
    pub location: FileLocation,
    /// What the problem is.
    pub kind: CompileErrorKind,
}

impl CompileError {
    /// A diagnostic of `kind` at `location`.
    pub fn new(location: FileLocation, kind: CompileErrorKind) -> Self {
        Self { location, kind }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ERROR: {}", self.location, self.kind)?;
        for (location, note) in self.kind.notes() {
            write!(f, "\n{location}: NOTE: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Everything that can go wrong while building a program.
#[derive(Debug, thiserror::Error)]
pub enum CompileErrorKind {
    // -- lexical --------------------------------------------------------
    /// The tokenizer hit a character no token starts with.
    #[error("unknown token starts with `{0}`")]
    UnknownToken(char),
    /// A string literal has no closing quote on its line.
    #[error("could not find closing `\"`")]
    UnclosedStringLiteral,
    /// A char literal has no closing quote on its line.
    #[error("could not find closing `'`")]
    UnclosedCharLiteral,
    /// A `\x` escape the string syntax does not define.
    #[error("unknown escape sequence `\\{0}`")]
    UnknownEscapeSequence(char),

    // -- syntactic ------------------------------------------------------
    /// A token of one kind appeared where another was required.
    #[error("expected {expected} but got {found}")]
    UnexpectedToken {
        /// The kind the grammar requires here.
        expected: TokenKind,
        /// The kind actually found.
        found: TokenKind,
    },
    /// The line ended where a token was required.
    #[error("expected {0} but reached the end of the line")]
    MissingToken(TokenKind),
    /// Leftover tokens after a complete expression.
    #[error("unexpected token `{0}`")]
    TrailingToken(String),
    /// An expression was required but the text is empty.
    #[error("cannot parse empty expression")]
    EmptyExpression,
    /// A number token that parses neither as integer nor float.
    #[error("`{0}` is not a number literal")]
    BadNumberLiteral(String),
    /// A `0x` token with non-hex digits.
    #[error("`{0}` is not a hex literal")]
    BadHexLiteral(String),
    /// Char literals must fit into a single word.
    #[error("the length of a char literal has to be at most 8 bytes to fit into a word")]
    CharLiteralTooLong,
    /// A token that cannot open a primary expression.
    #[error("expected primary expression but found {0}")]
    ExpectedPrimary(TokenKind),
    /// A `%directive` the grammar does not know (and that is not a macro
    /// call).
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    /// A block directive was never closed.
    #[error("expected `%end` at the end of the `%{block}` block")]
    MissingBlockEnd {
        /// Which block construct is unterminated.
        block: &'static str,
        /// Where the block was opened.
        opened: FileLocation,
    },
    /// `%if` must be continued by `%end`, `%else` or `%elif`.
    #[error("expected `%end`, `%else` or `%elif` after `%if`")]
    UnterminatedIf {
        /// Where the `%if` is.
        opened: FileLocation,
    },
    /// `%else` must be closed by `%end`.
    #[error("expected `%end` after `%else`")]
    UnterminatedElse {
        /// Where the `%else` is.
        opened: FileLocation,
    },
    /// A block-closing directive with no block open.
    #[error("`%{0}` closes no open block")]
    StrayBlockEnd(String),
    /// A binding name was required.
    #[error("expected binding name")]
    ExpectedBindingName,
    /// A string literal was required.
    #[error("expected a string literal")]
    ExpectedStringLiteral,
    /// An instruction mnemonic that is not in the instruction set.
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),

    // -- semantic -------------------------------------------------------
    /// A name that resolves to no binding in any enclosing scope.
    #[error("unknown binding `{0}`")]
    UnknownBinding(String),
    /// The same name bound twice within one scope.
    #[error("name `{name}` is already bound")]
    BindingRedefinition {
        /// The name in question.
        name: String,
        /// Where it was first bound.
        first: FileLocation,
    },
    /// The same macro name defined twice within one scope.
    #[error("macro with the name `{name}` is already defined")]
    MacroRedefinition {
        /// The name in question.
        name: String,
        /// Where it was first defined.
        first: FileLocation,
    },
    /// A macro call with no matching definition in scope.
    #[error("macro `{0}` is not defined")]
    UnknownMacro(String),
    /// A macro call whose argument count does not match its definition.
    #[error("provided {provided} arguments to the `{name}` macro call, but its definition expects {expected}")]
    MacroArityMismatch {
        /// Macro name.
        name: String,
        /// Arguments at the call site.
        provided: usize,
        /// Formal parameters at the definition.
        expected: usize,
        /// Where the macro is defined.
        defined: FileLocation,
    },
    /// A binding whose definition depends on its own value.
    #[error("cycling binding definition")]
    CyclicBinding {
        /// The binding being evaluated when the cycle closed.
        name: String,
    },
    /// An eagerly evaluated construct depends on a label whose address the
    /// construct itself could shift.
    #[error("the {construct} depends on the ambiguous value of the label `{label}`, which could be offset by the {construct} itself; define the label before the {construct} that depends on it")]
    AmbiguousLabel {
        /// The construct doing the eager evaluation (`%if` block, `%for`
        /// block, macro call).
        construct: &'static str,
        /// Name of the still-deferred label.
        label: String,
        /// Where the label is defined.
        label_location: FileLocation,
    },
    /// A `%assert` whose condition evaluated to zero.
    #[error("assertion failed")]
    AssertionFailed,
    /// An explicit `%error` directive.
    #[error("{0}")]
    UserError(String),
    /// Includes nested deeper than the translator allows.
    #[error("exceeded maximum include level {0}")]
    IncludeDepthExceeded(usize),
    /// A file could not be read.
    #[error("could not read file `{}`: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O failure.
        source: io::Error,
    },
    /// A translation-time function the evaluator does not provide.
    #[error("unknown translation time function `{0}`")]
    UnknownFunction(String),
    /// A built-in translation-time function called with the wrong number of
    /// arguments.
    #[error("{name}() expects {expected} arguments but got {actual}")]
    FuncallArity {
        /// Function name.
        name: String,
        /// Required argument count.
        expected: usize,
        /// Provided argument count.
        actual: usize,
    },
    /// `len()` of an address no string or byte array was interned at.
    #[error("could not compute the length of the string at address {0}")]
    UnknownStringLength(u64),
    /// Division or remainder by zero while folding a constant expression.
    #[error("division by zero in constant expression")]
    ConstDivByZero,
    /// A second `%entry` directive.
    #[error("entry point has already been set")]
    EntryAlreadySet {
        /// Where the first `%entry` is.
        first: FileLocation,
    },
    /// `%entry` only accepts a binding name.
    #[error("only bindings are allowed to be set as entry points")]
    EntryNotBinding,
    /// The entry binding must be a label.
    #[error("trying to set a {0} binding as an entry point; the entry point has to be a label")]
    EntryNotLabel(BindingKind),
    /// The program never set an entry point.
    #[error("entry point is not provided; mark a label with the %entry directive, e.g. `%entry main:`")]
    MissingEntry,
    /// `call` through a binding that is not a label.
    #[error("trying to call `{name}`, which is a {kind} binding; `call` accepts only literals and labels")]
    CallTargetNotLabel {
        /// The binding name in the operand.
        name: String,
        /// What the binding actually is.
        kind: BindingKind,
    },
    /// `native` through a binding that was not defined by `%native`.
    #[error("trying to invoke a native function from a {0} binding; native bindings are defined with the %native directive")]
    NativeTargetNotNative(BindingKind),
    /// A native name that does not fit the fixed-size image record.
    #[error("native function name exceeds the limit of {0} bytes")]
    NativeNameTooLong(usize),
    /// The program section is full.
    #[error("program capacity of {0} instructions exceeded")]
    TooManyInstructions(usize),
    /// The data memory is full.
    #[error("data memory capacity of {0} bytes exceeded")]
    OutOfDataMemory(usize),
    /// The externals table is full.
    #[error("externals capacity of {0} native names exceeded")]
    TooManyExternals(usize),

    // -- verifier -------------------------------------------------------
    /// An instruction consumed a frame of the wrong type.
    #[error("TYPE CHECK ERROR! instruction `{mnemonic}` expected `{expected}` but found `{actual}`")]
    TypeMismatch {
        /// Mnemonic of the offending instruction.
        mnemonic: &'static str,
        /// The input type the signature requires.
        expected: Type,
        /// The type actually on the shadow stack.
        actual: Type,
        /// Where the offending frame was pushed.
        origin: FileLocation,
    },
    /// The shadow stack ran dry.
    #[error("stack underflow")]
    VerifyStackUnderflow,
    /// The shadow stack exceeded the machine's stack capacity.
    #[error("stack overflow")]
    VerifyStackOverflow,
    /// The verifier does not cover this instruction.
    #[error("verification for instruction `{0}` is not implemented yet")]
    VerifyNotImplemented(&'static str),
    /// The entry address does not point into the program.
    #[error("entry point is an illegal instruction address")]
    EntryOutOfRange,
    /// Verification walked past the last instruction without a `halt`.
    #[error("verification ran past the end of the program; missing `halt`?")]
    VerifyRanOffProgram,

    /// An internal invariant of the translator was violated.
    #[error("internal invariant violated: {0}")]
    Bug(&'static str),
}

impl CompileErrorKind {
    /// Secondary locations worth pointing the user at.
    pub fn notes(&self) -> Vec<(FileLocation, String)> {
        match self {
            Self::BindingRedefinition { first, .. } => {
                vec![(first.clone(), "first binding is located here".to_owned())]
            }
            Self::MacroRedefinition { first, .. } => {
                vec![(first.clone(), "the macro is defined here".to_owned())]
            }
            Self::MacroArityMismatch { defined, .. } => {
                vec![(defined.clone(), "the macro is defined here".to_owned())]
            }
            Self::AmbiguousLabel {
                label,
                label_location,
                construct,
            } => vec![(
                label_location.clone(),
                format!("the value of the label `{label}` is ambiguous because of the {construct} above it"),
            )],
            Self::EntryAlreadySet { first } => {
                vec![(first.clone(), "the first entry point".to_owned())]
            }
            Self::TypeMismatch { origin, .. } => {
                vec![(origin.clone(), "the argument was introduced here".to_owned())]
            }
            Self::MissingBlockEnd { opened, block } => {
                vec![(opened.clone(), format!("the %{block} block starts here"))]
            }
            Self::UnterminatedIf { opened } => {
                vec![(opened.clone(), "%if is here".to_owned())]
            }
            Self::UnterminatedElse { opened } => {
                vec![(opened.clone(), "%else is here".to_owned())]
            }
            _ => Vec::new(),
        }
    }
}
