//! The translator: statement blocks in, program image out.
//!
//! Each block is translated in two passes. The first pass registers names:
//! labels become deferred bindings, consts bind their expressions
//! unevaluated, natives get their ids, includes pull whole files in, macros
//! are recorded with the scope they capture. The second pass emits code:
//! instructions are appended with their operands queued for later resolution,
//! labels are promoted to the addresses the emission has reached, and the
//! eagerly-evaluated constructs (`%if`, `%for`, macro calls) expand.
//!
//! After the root block, three fix-up sweeps run in order: deferred asserts,
//! deferred operands, deferred entry. Only then is every label address known.

use std::path::{Path, PathBuf};

use bm_asm::{inst_def, Inst, Opcode, Type, Word};
use bm_vm::consts::{
    EXTERNALS_CAPACITY, MEMORY_CAPACITY, NATIVE_NAME_CAPACITY, PROGRAM_CAPACITY,
};
use bm_vm::image::{Image, LoadError};

use crate::error::{CompileError, CompileErrorKind};
use crate::expr::{BinaryOpKind, Expr, Funcall};
use crate::location::FileLocation;
use crate::scope::{BindingKind, BindingRef, BindingStatus, Macrodef, ScopeArena, ScopeId};
use crate::statement::{Statement, StatementKind};

/// How deep `%include` may nest.
pub const MAX_INCLUDE_LEVEL: usize = 69;

/// The emitted artifact of a translation.
///
/// Alongside the sections that end up in the [`Image`], the assembly carries
/// what only the verifier consumes: the source location of every instruction
/// and the static type of every resolved operand.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    /// The emitted program.
    pub program: Vec<Inst>,
    /// Source location of each instruction, parallel to `program`.
    pub locations: Vec<FileLocation>,
    /// Static operand type of each instruction, parallel to `program`;
    /// `Type::Any` for instructions without an operand.
    pub operand_types: Vec<Type>,
    /// The entry address, valid once `has_entry` is set.
    pub entry: u64,
    /// Whether `%entry` resolved to an address.
    pub has_entry: bool,
    /// Where the effective `%entry` directive is.
    pub entry_location: Option<FileLocation>,
    /// Initial data memory.
    pub memory: Vec<u8>,
    /// Offset the initial memory is loaded at.
    pub memory_base: u64,
    /// Declared data memory capacity.
    pub memory_capacity: u64,
    /// External native names, in id order.
    pub externals: Vec<String>,
}

impl Assembly {
    /// Package the sections that survive into the binary image.
    pub fn to_image(&self) -> Image {
        Image {
            program: self.program.clone(),
            entry: self.entry,
            memory_base: self.memory_base,
            memory: self.memory.clone(),
            memory_capacity: self.memory_capacity,
            externals: self.externals.clone(),
        }
    }
}

/// Outcome of evaluating a compile-time expression.
///
/// `Deferred` is not a failure: it tells the caller the expression leans on a
/// label whose address is still unknown, and must be retried from a fix-up
/// queue once the whole program is emitted.
enum Eval {
    Ready { value: Word, ty: Type },
    Deferred(BindingRef),
}

struct DeferredOperand {
    addr: usize,
    expr: Expr,
    location: FileLocation,
    scope: ScopeId,
}

struct DeferredAssert {
    condition: Expr,
    location: FileLocation,
    scope: ScopeId,
}

struct DeferredEntry {
    name: String,
    location: FileLocation,
    scope: ScopeId,
}

struct StringLength {
    addr: u64,
    length: u64,
}

/// The translator.
pub struct Assembler {
    pub(crate) scopes: ScopeArena,
    current: ScopeId,
    out: Assembly,
    string_lengths: Vec<StringLength>,
    deferred_operands: Vec<DeferredOperand>,
    deferred_asserts: Vec<DeferredAssert>,
    deferred_entry: Option<DeferredEntry>,
    include_level: usize,
    include_location: Option<FileLocation>,
    include_paths: Vec<PathBuf>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// A fresh translator with an empty global scope.
    pub fn new() -> Self {
        let mut scopes = ScopeArena::default();
        let global = scopes.alloc(None);
        Self {
            scopes,
            current: global,
            out: Assembly::default(),
            string_lengths: Vec::new(),
            deferred_operands: Vec::new(),
            deferred_asserts: Vec::new(),
            deferred_entry: None,
            include_level: 0,
            include_location: None,
            include_paths: Vec::new(),
        }
    }

    /// Append a directory to the ordered `%include` search path.
    pub fn push_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    /// The emitted artifact.
    pub fn assembly(&self) -> &Assembly {
        &self.out
    }

    /// Consume the translator, keeping only the artifact.
    pub fn into_assembly(self) -> Assembly {
        self.out
    }

    /// Package the artifact into a binary image.
    pub fn to_image(&self) -> Image {
        self.out.to_image()
    }

    /// Write the artifact to a `.bm` file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        self.to_image().save(path)
    }

    /// Translate a root source file and run the fix-up sweeps.
    pub fn translate_root_file(&mut self, path: impl AsRef<Path>) -> Result<(), CompileError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| {
            CompileError::new(
                FileLocation::whole_file(path.display().to_string()),
                CompileErrorKind::Io {
                    path: path.to_owned(),
                    source,
                },
            )
        })?;
        self.translate_root_source(&source, &path.display().to_string())
    }

    /// Translate root source text and run the fix-up sweeps.
    pub fn translate_root_source(
        &mut self,
        source: &str,
        file_path: &str,
    ) -> Result<(), CompileError> {
        self.push_new_scope();
        self.translate_source(source, file_path)?;
        self.pop_scope();

        self.eval_deferred_asserts()?;
        self.eval_deferred_operands()?;
        self.eval_deferred_entry()?;

        if !self.out.has_entry {
            return Err(CompileError::new(
                FileLocation::whole_file(file_path),
                CompileErrorKind::MissingEntry,
            ));
        }

        tracing::debug!(
            file_path,
            instructions = self.out.program.len(),
            memory = self.out.memory.len(),
            externals = self.out.externals.len(),
            "translated program"
        );
        Ok(())
    }

    fn translate_source(&mut self, source: &str, file_path: &str) -> Result<(), CompileError> {
        tracing::debug!(file_path, level = self.include_level, "translating source file");
        let block = crate::statement::parse_source(source, file_path)?;
        self.translate_block(&block)
    }

    /// Translate one block with the two passes described in the module docs.
    pub fn translate_block(&mut self, block: &[Statement]) -> Result<(), CompileError> {
        // First pass: register names, pull includes in, record macros.
        for statement in block {
            let location = &statement.location;
            match &statement.kind {
                StatementKind::Label { name } => {
                    self.scopes.defer_binding(self.current, name, location)?;
                }
                StatementKind::Const { name, value } => {
                    self.scopes
                        .bind_expr(self.current, name, value.clone(), location)?;
                }
                StatementKind::Native { name } => self.translate_native(name, location)?,
                StatementKind::Include { path } => self.translate_include(path, location)?,
                StatementKind::Assert { condition } => {
                    self.deferred_asserts.push(DeferredAssert {
                        condition: condition.clone(),
                        location: location.clone(),
                        scope: self.current,
                    });
                }
                StatementKind::Error { message } => {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::UserError(message.clone()),
                    ));
                }
                StatementKind::Entry { value } => self.translate_entry(value, location)?,
                StatementKind::Block(inner) => self.translate_block(inner)?,
                StatementKind::Macrodef { name, args, body } => {
                    self.scopes.add_macrodef(
                        self.current,
                        Macrodef {
                            name: name.clone(),
                            args: args.clone(),
                            body: body.clone(),
                            location: location.clone(),
                            scope: self.current,
                        },
                    )?;
                }

                StatementKind::EmitInst { .. }
                | StatementKind::If { .. }
                | StatementKind::Scope(_)
                | StatementKind::For { .. }
                | StatementKind::Macrocall { .. } => {}
            }
        }

        // Second pass: emit code and expand the eager constructs.
        for statement in block {
            let location = &statement.location;
            match &statement.kind {
                StatementKind::EmitInst { opcode, operand } => {
                    self.translate_emit_inst(*opcode, operand.as_ref(), location)?;
                }
                StatementKind::Label { name } => self.promote_label(name, location)?,
                StatementKind::If {
                    condition,
                    then,
                    otherwise,
                } => self.translate_if(condition, then, otherwise.as_deref(), location)?,
                StatementKind::Scope(inner) => {
                    self.push_new_scope();
                    self.translate_block(inner)?;
                    self.pop_scope();
                }
                StatementKind::For {
                    var,
                    from,
                    to,
                    body,
                } => self.translate_for(var, from, to, body, location)?,
                StatementKind::Macrocall { name, args } => {
                    self.translate_macrocall(name, args, location)?;
                }

                StatementKind::Const { .. }
                | StatementKind::Native { .. }
                | StatementKind::Include { .. }
                | StatementKind::Assert { .. }
                | StatementKind::Error { .. }
                | StatementKind::Entry { .. }
                | StatementKind::Block(_)
                | StatementKind::Macrodef { .. } => {}
            }
        }

        Ok(())
    }

    fn translate_emit_inst(
        &mut self,
        opcode: Opcode,
        operand: Option<&Expr>,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        if self.out.program.len() >= PROGRAM_CAPACITY {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::TooManyInstructions(PROGRAM_CAPACITY),
            ));
        }

        let addr = self.out.program.len();
        self.out.program.push(Inst::plain(opcode));
        self.out.locations.push(location.clone());
        self.out.operand_types.push(Type::Any);

        if inst_def(opcode).has_operand {
            let Some(operand) = operand else {
                return Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::Bug("operand-taking instruction parsed without operand"),
                ));
            };
            self.deferred_operands.push(DeferredOperand {
                addr,
                expr: operand.clone(),
                location: location.clone(),
                scope: self.current,
            });
        }

        Ok(())
    }

    fn promote_label(&mut self, name: &str, location: &FileLocation) -> Result<(), CompileError> {
        let Some(binding) = self.scopes.resolve_binding(self.current, name) else {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::Bug("label was not registered by the first pass"),
            ));
        };

        let addr = self.out.program.len() as u64;
        let binding = self.scopes.binding_mut(binding);
        if binding.kind != BindingKind::Label || binding.status != BindingStatus::Deferred {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::Bug("label binding is not a deferred label"),
            ));
        }
        binding.status = BindingStatus::Evaluated;
        binding.value = Word::from(addr);
        Ok(())
    }

    fn translate_native(&mut self, name: &str, location: &FileLocation) -> Result<(), CompileError> {
        if name.len() >= NATIVE_NAME_CAPACITY {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::NativeNameTooLong(NATIVE_NAME_CAPACITY - 1),
            ));
        }
        if self.out.externals.len() >= EXTERNALS_CAPACITY {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::TooManyExternals(EXTERNALS_CAPACITY),
            ));
        }

        let id = self.out.externals.len() as u64;
        self.scopes.bind_value(
            self.current,
            BindingKind::Native,
            name,
            Word::from(id),
            Type::NativeId,
            location,
        )?;
        self.out.externals.push(name.to_owned());
        Ok(())
    }

    fn translate_entry(&mut self, value: &Expr, location: &FileLocation) -> Result<(), CompileError> {
        if let Some(existing) = &self.deferred_entry {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::EntryAlreadySet {
                    first: existing.location.clone(),
                },
            ));
        }

        let Expr::Binding(name) = value else {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::EntryNotBinding,
            ));
        };

        self.deferred_entry = Some(DeferredEntry {
            name: name.clone(),
            location: location.clone(),
            scope: self.current,
        });
        Ok(())
    }

    fn translate_include(&mut self, path: &str, location: &FileLocation) -> Result<(), CompileError> {
        if self.include_level >= MAX_INCLUDE_LEVEL {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::IncludeDepthExceeded(MAX_INCLUDE_LEVEL),
            ));
        }

        let resolved = self.resolve_include_path(path);
        tracing::debug!(path, resolved = %resolved.display(), "including file");

        let source = std::fs::read_to_string(&resolved).map_err(|source| {
            CompileError::new(
                location.clone(),
                CompileErrorKind::Io {
                    path: resolved.clone(),
                    source,
                },
            )
        })?;

        let saved_location = self.include_location.take();
        self.include_location = Some(location.clone());
        self.include_level += 1;
        let result = self.translate_source(&source, &resolved.display().to_string());
        self.include_level -= 1;
        self.include_location = saved_location;
        result
    }

    /// Resolve an include path against the search directories, first hit
    /// wins; a path that exists as written is used as-is.
    fn resolve_include_path(&self, path: &str) -> PathBuf {
        for dir in &self.include_paths {
            let candidate = dir.join(path);
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from(path)
    }

    fn translate_if(
        &mut self,
        condition: &Expr,
        then: &[Statement],
        otherwise: Option<&[Statement]>,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        let (condition, _) = self.eval_eager(condition, "%if block", location)?;

        if condition.as_u64() != 0 {
            self.push_new_scope();
            self.translate_block(then)?;
            self.pop_scope();
        } else if let Some(otherwise) = otherwise {
            self.push_new_scope();
            self.translate_block(otherwise)?;
            self.pop_scope();
        }
        Ok(())
    }

    fn translate_for(
        &mut self,
        var: &str,
        from: &Expr,
        to: &Expr,
        body: &[Statement],
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        let (from, _) = self.eval_eager(from, "%for block", location)?;
        let (to, _) = self.eval_eager(to, "%for block", location)?;

        for value in from.as_i64()..=to.as_i64() {
            self.push_new_scope();
            self.scopes.bind_value(
                self.current,
                BindingKind::Const,
                var,
                Word::from(value),
                Type::Signed,
                location,
            )?;
            self.translate_block(body)?;
            self.pop_scope();
        }
        Ok(())
    }

    fn translate_macrocall(
        &mut self,
        name: &str,
        args: &[Expr],
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        let Some(macrodef) = self.scopes.resolve_macrodef(self.current, name).cloned() else {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::UnknownMacro(name.to_owned()),
            ));
        };

        if args.len() != macrodef.args.len() {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::MacroArityMismatch {
                    name: name.to_owned(),
                    provided: args.len(),
                    expected: macrodef.args.len(),
                    defined: macrodef.location.clone(),
                },
            ));
        }

        // Arguments are evaluated in the call-site scope; the expansion then
        // runs against the definition-site scope with a fresh scope on top
        // binding the formals.
        let args_scope = self.scopes.alloc(Some(macrodef.scope));
        for (formal, actual) in macrodef.args.iter().zip(args) {
            let (value, ty) = self.eval_eager(actual, "macro call", location)?;
            self.scopes.bind_value(
                args_scope,
                BindingKind::Const,
                formal,
                value,
                ty,
                &macrodef.location,
            )?;
        }

        let saved = self.current;
        self.current = args_scope;
        self.translate_block(&macrodef.body)?;
        self.current = saved;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fix-up sweeps
    // ------------------------------------------------------------------

    fn eval_deferred_asserts(&mut self) -> Result<(), CompileError> {
        let asserts = std::mem::take(&mut self.deferred_asserts);
        let saved = self.current;

        for assert in &asserts {
            self.current = assert.scope;
            let value = match self.eval_expr(&assert.condition, &assert.location)? {
                Eval::Ready { value, .. } => value,
                Eval::Deferred(_) => {
                    return Err(CompileError::new(
                        assert.location.clone(),
                        CompileErrorKind::Bug("assert still deferred after label resolution"),
                    ))
                }
            };
            if value.as_u64() == 0 {
                return Err(CompileError::new(
                    assert.location.clone(),
                    CompileErrorKind::AssertionFailed,
                ));
            }
        }

        self.current = saved;
        Ok(())
    }

    fn eval_deferred_operands(&mut self) -> Result<(), CompileError> {
        let operands = std::mem::take(&mut self.deferred_operands);
        let saved = self.current;

        for deferred in &operands {
            self.current = deferred.scope;

            if let Expr::Binding(name) = &deferred.expr {
                let Some(binding) = self.scopes.resolve_binding(self.current, name) else {
                    return Err(CompileError::new(
                        deferred.location.clone(),
                        CompileErrorKind::UnknownBinding(name.clone()),
                    ));
                };
                let kind = self.scopes.binding(binding).kind;
                let opcode = self.out.program[deferred.addr].opcode;

                if opcode == Opcode::Call && kind != BindingKind::Label {
                    return Err(CompileError::new(
                        deferred.location.clone(),
                        CompileErrorKind::CallTargetNotLabel {
                            name: name.clone(),
                            kind,
                        },
                    ));
                }
                if opcode == Opcode::Native && kind != BindingKind::Native {
                    return Err(CompileError::new(
                        deferred.location.clone(),
                        CompileErrorKind::NativeTargetNotNative(kind),
                    ));
                }
            }

            match self.eval_expr(&deferred.expr, &deferred.location)? {
                Eval::Ready { value, ty } => {
                    self.out.program[deferred.addr].operand = value;
                    self.out.operand_types[deferred.addr] = ty;
                }
                Eval::Deferred(_) => {
                    return Err(CompileError::new(
                        deferred.location.clone(),
                        CompileErrorKind::Bug("operand still deferred after label resolution"),
                    ))
                }
            }
        }

        self.current = saved;
        Ok(())
    }

    fn eval_deferred_entry(&mut self) -> Result<(), CompileError> {
        let Some(entry) = self.deferred_entry.take() else {
            return Ok(());
        };
        let saved = self.current;
        self.current = entry.scope;

        let Some(binding) = self.scopes.resolve_binding(self.current, &entry.name) else {
            return Err(CompileError::new(
                entry.location.clone(),
                CompileErrorKind::UnknownBinding(entry.name.clone()),
            ));
        };

        let kind = self.scopes.binding(binding).kind;
        if kind != BindingKind::Label {
            return Err(CompileError::new(
                entry.location.clone(),
                CompileErrorKind::EntryNotLabel(kind),
            ));
        }

        let value = match self.eval_binding(binding)? {
            Eval::Ready { value, .. } => value,
            Eval::Deferred(_) => {
                return Err(CompileError::new(
                    entry.location.clone(),
                    CompileErrorKind::Bug("entry label still deferred after label resolution"),
                ))
            }
        };

        self.out.entry = value.as_u64();
        self.out.has_entry = true;
        self.out.entry_location = Some(entry.location);
        self.current = saved;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    /// Evaluate an expression that must resolve right now. Depending on a
    /// still-deferred label here is the circular-dependency error: the
    /// construct could shift the very address it asks about.
    fn eval_eager(
        &mut self,
        expr: &Expr,
        construct: &'static str,
        location: &FileLocation,
    ) -> Result<(Word, Type), CompileError> {
        match self.eval_expr(expr, location)? {
            Eval::Ready { value, ty } => Ok((value, ty)),
            Eval::Deferred(binding) => {
                let binding = self.scopes.binding(binding);
                Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::AmbiguousLabel {
                        construct,
                        label: binding.name.clone(),
                        label_location: binding.location.clone(),
                    },
                ))
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr, location: &FileLocation) -> Result<Eval, CompileError> {
        match expr {
            Expr::LitInt(value) => Ok(Eval::Ready {
                value: Word::from(*value),
                ty: Type::Unsigned,
            }),
            Expr::LitFloat(value) => Ok(Eval::Ready {
                value: Word::from(*value),
                ty: Type::Float,
            }),
            Expr::LitChar(value) => Ok(Eval::Ready {
                value: Word::from(*value),
                ty: Type::Unsigned,
            }),
            Expr::LitStr(text) => {
                let value = self.push_string_to_memory(text, location)?;
                Ok(Eval::Ready {
                    value,
                    ty: Type::MemAddr,
                })
            }
            Expr::Binding(name) => {
                let Some(binding) = self.scopes.resolve_binding(self.current, name) else {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::UnknownBinding(name.clone()),
                    ));
                };
                self.eval_binding(binding)
            }
            Expr::BinaryOp(op) => self.eval_binary_op(op.kind, &op.left, &op.right, location),
            Expr::Funcall(funcall) => self.eval_funcall(funcall, location),
        }
    }

    fn eval_binding(&mut self, binding: BindingRef) -> Result<Eval, CompileError> {
        let status = self.scopes.binding(binding).status;
        match status {
            BindingStatus::Unevaluated => {
                let (expr, binding_location) = {
                    let binding = self.scopes.binding_mut(binding);
                    binding.status = BindingStatus::Evaluating;
                    (binding.expr.clone(), binding.location.clone())
                };
                let Some(expr) = expr else {
                    return Err(CompileError::new(
                        binding_location,
                        CompileErrorKind::Bug("unevaluated binding without an expression"),
                    ));
                };

                match self.eval_expr(&expr, &binding_location)? {
                    Eval::Ready { value, ty } => {
                        let binding = self.scopes.binding_mut(binding);
                        binding.status = BindingStatus::Evaluated;
                        binding.value = value;
                        binding.ty = ty;
                        Ok(Eval::Ready { value, ty })
                    }
                    Eval::Deferred(deferred) => {
                        self.scopes.binding_mut(binding).status = BindingStatus::Unevaluated;
                        Ok(Eval::Deferred(deferred))
                    }
                }
            }
            BindingStatus::Evaluating => {
                let binding = self.scopes.binding(binding);
                Err(CompileError::new(
                    binding.location.clone(),
                    CompileErrorKind::CyclicBinding {
                        name: binding.name.clone(),
                    },
                ))
            }
            BindingStatus::Evaluated => {
                let binding = self.scopes.binding(binding);
                Ok(Eval::Ready {
                    value: binding.value,
                    ty: binding.ty,
                })
            }
            BindingStatus::Deferred => Ok(Eval::Deferred(binding)),
        }
    }

    fn eval_binary_op(
        &mut self,
        kind: BinaryOpKind,
        left: &Expr,
        right: &Expr,
        location: &FileLocation,
    ) -> Result<Eval, CompileError> {
        let left = match self.eval_expr(left, location)? {
            Eval::Ready { value, .. } => value,
            deferred => return Ok(deferred),
        };
        let right = match self.eval_expr(right, location)? {
            Eval::Ready { value, .. } => value,
            deferred => return Ok(deferred),
        };

        // Constant folding happens under the u64 interpretation no matter
        // what the operands are.
        let (a, b) = (left.as_u64(), right.as_u64());
        let (value, ty) = match kind {
            BinaryOpKind::Plus => (a.wrapping_add(b), Type::Unsigned),
            BinaryOpKind::Minus => (a.wrapping_sub(b), Type::Unsigned),
            BinaryOpKind::Mult => (a.wrapping_mul(b), Type::Unsigned),
            BinaryOpKind::Div => {
                if b == 0 {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::ConstDivByZero,
                    ));
                }
                (a / b, Type::Unsigned)
            }
            BinaryOpKind::Mod => {
                if b == 0 {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::ConstDivByZero,
                    ));
                }
                (a % b, Type::Unsigned)
            }
            BinaryOpKind::Gt => (u64::from(a > b), Type::Bool),
            BinaryOpKind::Lt => (u64::from(a < b), Type::Bool),
            BinaryOpKind::Equals => (u64::from(a == b), Type::Bool),
        };

        Ok(Eval::Ready {
            value: Word::from(value),
            ty,
        })
    }

    fn eval_funcall(
        &mut self,
        funcall: &Funcall,
        location: &FileLocation,
    ) -> Result<Eval, CompileError> {
        match funcall.name.as_str() {
            "len" => {
                self.expect_arity(funcall, 1, location)?;
                let addr = match self.eval_expr(&funcall.args[0], location)? {
                    Eval::Ready { value, .. } => value.as_u64(),
                    deferred => return Ok(deferred),
                };
                let Some(length) = self
                    .string_lengths
                    .iter()
                    .find(|entry| entry.addr == addr)
                    .map(|entry| entry.length)
                else {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::UnknownStringLength(addr),
                    ));
                };
                Ok(Eval::Ready {
                    value: Word::from(length),
                    ty: Type::Unsigned,
                })
            }

            "byte_array" => {
                self.expect_arity(funcall, 2, location)?;
                let size = match self.eval_expr(&funcall.args[0], location)? {
                    Eval::Ready { value, .. } => value.as_u64(),
                    deferred => return Ok(deferred),
                };
                let fill = match self.eval_expr(&funcall.args[1], location)? {
                    Eval::Ready { value, .. } => value.as_u64() as u8,
                    deferred => return Ok(deferred),
                };
                let value = self.push_byte_array_to_memory(size, fill, location)?;
                Ok(Eval::Ready {
                    value,
                    ty: Type::MemAddr,
                })
            }

            "int32" => {
                self.expect_arity(funcall, 1, location)?;
                let init = match self.eval_expr(&funcall.args[0], location)? {
                    Eval::Ready { value, .. } => value.as_u64() as u32,
                    deferred => return Ok(deferred),
                };
                let value = self.push_buffer_to_memory(&init.to_le_bytes(), location)?;
                Ok(Eval::Ready {
                    value,
                    ty: Type::MemAddr,
                })
            }

            "file" => {
                self.expect_arity(funcall, 1, location)?;
                let Expr::LitStr(path) = &funcall.args[0] else {
                    return Err(CompileError::new(
                        location.clone(),
                        CompileErrorKind::ExpectedStringLiteral,
                    ));
                };
                let content = std::fs::read(path).map_err(|source| {
                    CompileError::new(
                        location.clone(),
                        CompileErrorKind::Io {
                            path: PathBuf::from(path),
                            source,
                        },
                    )
                })?;
                let value = self.push_buffer_to_memory(&content, location)?;
                Ok(Eval::Ready {
                    value,
                    ty: Type::MemAddr,
                })
            }

            _ => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::UnknownFunction(funcall.name.clone()),
            )),
        }
    }

    fn expect_arity(
        &self,
        funcall: &Funcall,
        expected: usize,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        if funcall.args.len() != expected {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::FuncallArity {
                    name: funcall.name.clone(),
                    expected,
                    actual: funcall.args.len(),
                },
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data memory
    // ------------------------------------------------------------------

    fn push_buffer_to_memory(
        &mut self,
        bytes: &[u8],
        location: &FileLocation,
    ) -> Result<Word, CompileError> {
        if self.out.memory.len() + bytes.len() > MEMORY_CAPACITY {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::OutOfDataMemory(MEMORY_CAPACITY),
            ));
        }

        let addr = self.out.memory.len() as u64;
        self.out.memory.extend_from_slice(bytes);
        self.out.memory_capacity = self.out.memory_capacity.max(self.out.memory.len() as u64);
        self.string_lengths.push(StringLength {
            addr,
            length: bytes.len() as u64,
        });
        Ok(Word::from(addr))
    }

    fn push_string_to_memory(
        &mut self,
        text: &str,
        location: &FileLocation,
    ) -> Result<Word, CompileError> {
        self.push_buffer_to_memory(text.as_bytes(), location)
    }

    fn push_byte_array_to_memory(
        &mut self,
        size: u64,
        fill: u8,
        location: &FileLocation,
    ) -> Result<Word, CompileError> {
        if self.out.memory.len() as u64 + size > MEMORY_CAPACITY as u64 {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::OutOfDataMemory(MEMORY_CAPACITY),
            ));
        }

        let addr = self.out.memory.len() as u64;
        self.out
            .memory
            .resize(self.out.memory.len() + size as usize, fill);
        self.out.memory_capacity = self.out.memory_capacity.max(self.out.memory.len() as u64);
        self.string_lengths.push(StringLength { addr, length: size });
        Ok(Word::from(addr))
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn push_new_scope(&mut self) {
        self.current = self.scopes.alloc(Some(self.current));
    }

    fn pop_scope(&mut self) {
        if let Some(previous) = self.scopes.previous(self.current) {
            self.current = previous;
        }
    }
}
