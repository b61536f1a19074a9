//! Lexically nested scopes, bindings and macro definitions.
//!
//! Scopes are allocated into a build-lifetime arena and addressed by
//! [`ScopeId`]. Popping a scope only unlinks it from the chain the assembler
//! walks; the scope itself stays alive, because deferred operands, deferred
//! asserts and macro definitions keep referring to the environment they were
//! recorded in long after the block that created it has closed.

use std::fmt;

use bm_asm::{Type, Word};

use crate::error::{CompileError, CompileErrorKind};
use crate::expr::Expr;
use crate::location::FileLocation;
use crate::statement::Block;

/// What a name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A `%const` definition.
    Const,
    /// A label; its value is an instruction address.
    Label,
    /// A `%native` definition; its value is a native id.
    Native,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Const => "const",
            Self::Label => "label",
            Self::Native => "native",
        })
    }
}

/// Where a binding is in its evaluation lifecycle.
///
/// Expression-defined bindings take `Unevaluated -> Evaluating -> Evaluated`
/// exactly once; observing `Evaluating` on entry means the definition is
/// cyclic. Labels are born `Deferred` in the first pass and promoted to
/// `Evaluated` when the second pass reaches their position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStatus {
    /// The defining expression has not been needed yet.
    Unevaluated,
    /// The defining expression is being evaluated right now (cycle sentinel).
    Evaluating,
    /// `value` and `ty` are final.
    Evaluated,
    /// A label whose address is not known until the second pass reaches it.
    Deferred,
}

/// A named value recorded in a scope.
#[derive(Debug, Clone)]
pub struct Binding {
    /// What the name stands for.
    pub kind: BindingKind,
    /// The name itself.
    pub name: String,
    /// The value, meaningful once `status` is `Evaluated`.
    pub value: Word,
    /// Static type of the value, used by the verifier and the symbol table.
    pub ty: Type,
    /// The defining expression of an `Unevaluated` const.
    pub expr: Option<Expr>,
    /// Evaluation lifecycle state.
    pub status: BindingStatus,
    /// Where the binding was introduced.
    pub location: FileLocation,
}

/// A `%macro` definition: a statement template with its formal parameters
/// and the scope that was active at the definition site. Free names in the
/// body resolve against that captured scope, not the call site.
#[derive(Debug, Clone)]
pub struct Macrodef {
    /// Macro name.
    pub name: String,
    /// Formal parameter names.
    pub args: Vec<String>,
    /// The statements to expand.
    pub body: Block,
    /// Where the macro is defined.
    pub location: FileLocation,
    /// The scope chain captured at the definition site.
    pub scope: ScopeId,
}

/// Handle to a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

/// A reference to one binding: the scope that holds it plus its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingRef {
    /// The scope holding the binding.
    pub scope: ScopeId,
    /// Index of the binding within that scope.
    pub index: usize,
}

#[derive(Debug, Default)]
struct Scope {
    previous: Option<ScopeId>,
    bindings: Vec<Binding>,
    macrodefs: Vec<Macrodef>,
}

/// The arena all scopes of one build live in.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Allocate a fresh scope whose parent is `previous`.
    pub fn alloc(&mut self, previous: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            previous,
            ..Scope::default()
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// The parent of `scope`, if any.
    pub fn previous(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].previous
    }

    /// Walk the chain starting at `scope` looking for a binding.
    pub fn resolve_binding(&self, scope: ScopeId, name: &str) -> Option<BindingRef> {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if let Some(index) = self.scopes[scope.0]
                .bindings
                .iter()
                .position(|binding| binding.name == name)
            {
                return Some(BindingRef { scope, index });
            }
            current = self.scopes[scope.0].previous;
        }
        None
    }

    /// Walk the chain starting at `scope` looking for a macro.
    pub fn resolve_macrodef(&self, scope: ScopeId, name: &str) -> Option<&Macrodef> {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if let Some(macrodef) = self.scopes[scope.0]
                .macrodefs
                .iter()
                .find(|macrodef| macrodef.name == name)
            {
                return Some(macrodef);
            }
            current = self.scopes[scope.0].previous;
        }
        None
    }

    /// Shared access to a binding.
    pub fn binding(&self, binding: BindingRef) -> &Binding {
        &self.scopes[binding.scope.0].bindings[binding.index]
    }

    /// Mutable access to a binding.
    pub fn binding_mut(&mut self, binding: BindingRef) -> &mut Binding {
        &mut self.scopes[binding.scope.0].bindings[binding.index]
    }

    /// Bind an already-evaluated value directly into `scope`.
    pub fn bind_value(
        &mut self,
        scope: ScopeId,
        kind: BindingKind,
        name: &str,
        value: Word,
        ty: Type,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        self.check_unbound(scope, name, location)?;
        self.scopes[scope.0].bindings.push(Binding {
            kind,
            name: name.to_owned(),
            value,
            ty,
            expr: None,
            status: BindingStatus::Evaluated,
            location: location.clone(),
        });
        Ok(())
    }

    /// Bind a const to an expression evaluated lazily on first use.
    pub fn bind_expr(
        &mut self,
        scope: ScopeId,
        name: &str,
        expr: Expr,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        self.check_unbound(scope, name, location)?;
        self.scopes[scope.0].bindings.push(Binding {
            kind: BindingKind::Const,
            name: name.to_owned(),
            value: Word::ZERO,
            ty: Type::Any,
            expr: Some(expr),
            status: BindingStatus::Unevaluated,
            location: location.clone(),
        });
        Ok(())
    }

    /// Register a label whose address is not known yet.
    pub fn defer_binding(
        &mut self,
        scope: ScopeId,
        name: &str,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        self.check_unbound(scope, name, location)?;
        self.scopes[scope.0].bindings.push(Binding {
            kind: BindingKind::Label,
            name: name.to_owned(),
            value: Word::ZERO,
            ty: Type::InstAddr,
            expr: None,
            status: BindingStatus::Deferred,
            location: location.clone(),
        });
        Ok(())
    }

    /// Record a macro definition in `scope`.
    pub fn add_macrodef(&mut self, scope: ScopeId, macrodef: Macrodef) -> Result<(), CompileError> {
        if let Some(existing) = self.scopes[scope.0]
            .macrodefs
            .iter()
            .find(|existing| existing.name == macrodef.name)
        {
            return Err(CompileError::new(
                macrodef.location,
                CompileErrorKind::MacroRedefinition {
                    name: macrodef.name,
                    first: existing.location.clone(),
                },
            ));
        }
        self.scopes[scope.0].macrodefs.push(macrodef);
        Ok(())
    }

    /// Iterate over every binding of every scope ever created in this build.
    pub fn all_bindings(&self) -> impl Iterator<Item = &Binding> {
        self.scopes.iter().flat_map(|scope| scope.bindings.iter())
    }

    fn check_unbound(
        &self,
        scope: ScopeId,
        name: &str,
        location: &FileLocation,
    ) -> Result<(), CompileError> {
        if let Some(existing) = self.scopes[scope.0]
            .bindings
            .iter()
            .find(|binding| binding.name == name)
        {
            return Err(CompileError::new(
                location.clone(),
                CompileErrorKind::BindingRedefinition {
                    name: name.to_owned(),
                    first: existing.location.clone(),
                },
            ));
        }
        Ok(())
    }
}
