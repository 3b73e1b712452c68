//! Module checker: collects declarations, then checks every function as an
//! independent task and runs the ownership and visibility passes on it.

use std::collections::HashSet;

use tarn_ast::{self as ast, FunctionDecl, OwnershipKind, Span};
use tracing::debug;

use crate::env::TypeEnv;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::resolve::{Abort, Resolver};
use crate::symbols::SymbolTable;
use crate::typed_ast::{Binding, BindingId, TypedBlock, TypedExpr, TypedExprKind, TypedFunction, TypedModule, TypedStmtKind};
use crate::types::{Capability, FunctionSig, ModuleId, QualifiedName, StructLookup, Type};
use crate::unify::{CapabilityReason, Constraint, Solver};
use crate::{ownership, visibility};

/// Checks one source module against the symbols of its dependencies
pub struct Checker<'a> {
    pub(crate) module: &'a ast::Module,
    pub(crate) id: ModuleId,
    /// Dependencies plus this module's own declarations
    pub(crate) symbols: SymbolTable,
    pub(crate) poisoned: HashSet<QualifiedName>,
    pub(crate) own_structs: Vec<QualifiedName>,
    pub(crate) own_functions: Vec<(QualifiedName, &'a FunctionDecl)>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    pub fn new(module: &'a ast::Module, deps: &SymbolTable) -> Self {
        Self {
            module,
            id: ModuleId::new(module.package.clone(), module.name.clone()),
            symbols: deps.clone(),
            poisoned: HashSet::new(),
            own_structs: Vec::new(),
            own_functions: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<TypedModule, Vec<Diagnostic>> {
        self.collect();

        let mut functions = Vec::new();
        for (name, decl) in &self.own_functions {
            if self.poisoned.contains(name) {
                continue;
            }
            let Some(sig) = self.symbols.function(name) else {
                continue;
            };
            let resolver = Resolver { module: &self.id, symbols: &self.symbols, poisoned: &self.poisoned };
            match FnChecker::new(resolver, sig).check(decl) {
                Ok(mut typed) => {
                    let owned = ownership::check(&mut typed, &self.symbols);
                    let vis = visibility::check(&typed, &self.symbols, &self.id);
                    debug!(
                        function = %name,
                        ownership = owned.len(),
                        visibility = vis.len(),
                        "checked declaration"
                    );
                    self.diagnostics.extend(owned);
                    self.diagnostics.extend(vis);
                    functions.push(typed);
                }
                Err(Abort::Failed(diagnostic)) => {
                    debug!(function = %name, kind = %diagnostic.kind, "declaration failed inference");
                    self.diagnostics.push(diagnostic);
                }
                Err(Abort::Poisoned) => {}
            }
        }

        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }
        let structs = self
            .own_structs
            .iter()
            .filter_map(|name| self.symbols.struct_def(name).cloned())
            .collect();
        Ok(TypedModule { id: self.id, structs, functions })
    }
}

// =============================================================================
// Per-function inference task
// =============================================================================

pub(crate) struct FnChecker<'a> {
    pub(crate) resolver: Resolver<'a>,
    pub(crate) sig: &'a FunctionSig,
    pub(crate) solver: Solver,
    pub(crate) env: TypeEnv,
    pub(crate) bindings: Vec<Binding>,
    /// Guard refinement per binding, `None` when not narrowed
    pub(crate) narrowed: Vec<Option<Type>>,
    pub(crate) loop_depth: usize,
}

impl<'a> FnChecker<'a> {
    pub(crate) fn new(resolver: Resolver<'a>, sig: &'a FunctionSig) -> Self {
        Self {
            resolver,
            sig,
            solver: Solver::new(),
            env: TypeEnv::new(),
            bindings: Vec::new(),
            narrowed: Vec::new(),
            loop_depth: 0,
        }
    }

    pub(crate) fn check(mut self, decl: &FunctionDecl) -> Result<TypedFunction, Abort> {
        let sig = self.sig;
        let mut params = Vec::new();
        for (param, psig) in decl.params.iter().zip(&sig.params) {
            let id = self.declare(&param.name.value.name, psig.ty.clone(), param.mutable, psig.ownership, param.name.span);
            params.push(id);
        }

        let mut body = self.check_block(&decl.body)?;

        if self.sig.ret != Type::UNIT && !body.diverges() {
            return Err(Diagnostic::new(
                DiagnosticKind::MissingReturn,
                decl.body.span,
                format!("function `{}` may reach its end without returning `{}`", self.sig.name.name, self.sig.ret),
            )
            .with_note(self.sig.span, "return type declared here")
            .into());
        }

        let symbols = self.resolver.symbols;
        self.solver.finish(symbols)?;
        zonk_block(&mut self.solver, &mut body)?;
        for binding in &mut self.bindings {
            binding.ty = resolved(&mut self.solver, &binding.ty, binding.span)?;
        }

        Ok(TypedFunction { sig: self.sig.clone(), params, bindings: self.bindings, body })
    }

    pub(crate) fn declare(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
        ownership: OwnershipKind,
        span: Span,
    ) -> BindingId {
        let id = self.bindings.len() as BindingId;
        self.bindings.push(Binding { name: name.to_string(), ty, mutable, ownership, span });
        self.narrowed.push(None);
        self.env.declare(name.to_string(), id);
        id
    }

    /// Static type of a binding at this point, honoring guards
    pub(crate) fn effective_type(&self, id: BindingId) -> Type {
        self.narrowed[id as usize]
            .clone()
            .unwrap_or_else(|| self.bindings[id as usize].ty.clone())
    }

    pub(crate) fn constrain(&mut self, constraint: Constraint) -> Result<(), Abort> {
        let symbols = self.resolver.symbols;
        self.solver.add(constraint, symbols)?;
        Ok(())
    }

    pub(crate) fn equal(&mut self, expected: &Type, found: &Type, span: Span) -> Result<(), Abort> {
        self.constrain(Constraint::Equal { expected: expected.clone(), found: found.clone(), span })
    }

    pub(crate) fn subtype(&mut self, sub: &Type, sup: &Type, span: Span) -> Result<(), Abort> {
        self.constrain(Constraint::Subtype { sub: sub.clone(), sup: sup.clone(), span })
    }

    pub(crate) fn capability(&mut self, ty: &Type, cap: Capability, reason: CapabilityReason, span: Span) -> Result<(), Abort> {
        self.constrain(Constraint::Capability { ty: ty.clone(), cap, reason, span })
    }

    pub(crate) fn end_statement(&mut self) -> Result<(), Abort> {
        let symbols = self.resolver.symbols;
        self.solver.flush(symbols)?;
        Ok(())
    }
}

// =============================================================================
// Final substitution
// =============================================================================

fn resolved(solver: &mut Solver, ty: &Type, span: Span) -> Result<Type, Abort> {
    let ty = solver.apply(ty);
    if ty.has_vars() {
        return Err(Diagnostic::new(
            DiagnosticKind::AmbiguousType,
            span,
            format!("cannot infer a concrete type here (found `{}`); add a type annotation", ty),
        )
        .into());
    }
    Ok(ty)
}

fn zonk_block(solver: &mut Solver, block: &mut TypedBlock) -> Result<(), Abort> {
    for stmt in &mut block.stmts {
        match &mut stmt.kind {
            TypedStmtKind::Let { init: e, .. }
            | TypedStmtKind::Assign { value: e, .. }
            | TypedStmtKind::Expr(e)
            | TypedStmtKind::Print(e)
            | TypedStmtKind::Return(Some(e)) => zonk_expr(solver, e)?,
            TypedStmtKind::FieldAssign { object, value, .. } => {
                zonk_expr(solver, object)?;
                zonk_expr(solver, value)?;
            }
            TypedStmtKind::If { cond, then_block, else_block, .. } => {
                zonk_expr(solver, cond)?;
                zonk_block(solver, then_block)?;
                if let Some(block) = else_block {
                    zonk_block(solver, block)?;
                }
            }
            TypedStmtKind::While { cond, body, .. } => {
                zonk_expr(solver, cond)?;
                zonk_block(solver, body)?;
            }
            TypedStmtKind::Block(block) => zonk_block(solver, block)?,
            TypedStmtKind::Return(None) | TypedStmtKind::Break { .. } | TypedStmtKind::Continue => {}
        }
    }
    Ok(())
}

fn zonk_expr(solver: &mut Solver, expr: &mut TypedExpr) -> Result<(), Abort> {
    match &mut expr.kind {
        TypedExprKind::Literal(_) | TypedExprKind::Local { .. } => {}
        TypedExprKind::Unary { operand, .. } => zonk_expr(solver, operand)?,
        TypedExprKind::Binary { left, right, .. } => {
            zonk_expr(solver, left)?;
            zonk_expr(solver, right)?;
        }
        TypedExprKind::Call { type_args, args, .. } => {
            for ty in type_args.iter_mut() {
                *ty = resolved(solver, ty, expr.span)?;
            }
            for arg in args {
                zonk_expr(solver, &mut arg.expr)?;
            }
        }
        TypedExprKind::StructLit { fields, .. } => {
            for (_, value) in fields {
                zonk_expr(solver, value)?;
            }
        }
        TypedExprKind::Field { object, .. } => zonk_expr(solver, object)?,
        TypedExprKind::Borrow { place, .. } => zonk_expr(solver, place)?,
        TypedExprKind::Clone(inner) => zonk_expr(solver, inner)?,
    }
    expr.ty = resolved(solver, &expr.ty, expr.span)?;
    Ok(())
}
