//! Statement checking, flow-sensitive null narrowing, and loop context

use std::collections::HashSet;

use tarn_ast::{BinaryOp, Block, Expr, Literal, Node, OwnershipKind, Stmt};

use crate::checker::FnChecker;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::resolve::Abort;
use crate::typed_ast::{BindingId, TypedBlock, TypedExpr, TypedExprKind, TypedStmt, TypedStmtKind};
use crate::types::{PrimitiveKind, Type};

/// Narrowing state: one entry per binding declared so far
type Narrowing = Vec<Option<Type>>;

/// A null-comparison guard on a local
struct Guard {
    binding: BindingId,
    /// `x != null`: the then-branch sees `x` as non-null; `x == null`: the else-branch does
    then_refines: bool,
}

impl<'a> FnChecker<'a> {
    pub(crate) fn check_block(&mut self, block: &Node<Block>) -> Result<TypedBlock, Abort> {
        self.env.push_scope();
        let stmts = self.check_stmts(&block.value.stmts);
        self.env.pop_scope();
        Ok(TypedBlock { stmts: stmts?, span: block.span })
    }

    fn check_stmts(&mut self, stmts: &[Node<Stmt>]) -> Result<Vec<TypedStmt>, Abort> {
        let mut typed = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            typed.push(self.check_stmt(stmt)?);
            self.end_statement()?;
        }
        Ok(typed)
    }

    fn check_stmt(&mut self, stmt: &Node<Stmt>) -> Result<TypedStmt, Abort> {
        let span = stmt.span;
        let kind = match &stmt.value {
            Stmt::Let { name, mutable, ty, init } => {
                let init = self.check_expr(init)?;
                let ty = match ty {
                    Some(annotation) => {
                        let generics = self.sig.type_params.clone();
                        let declared = self.resolver.resolve_type(annotation, &generics)?;
                        self.subtype(&init.ty, &declared, init.span)?;
                        declared
                    }
                    None => init.ty.clone(),
                };
                let ownership = match &init.kind {
                    TypedExprKind::Borrow { mutable: true, .. } => OwnershipKind::Mut,
                    TypedExprKind::Borrow { mutable: false, .. } => OwnershipKind::Shared,
                    _ => OwnershipKind::Owned,
                };
                let binding = self.declare(&name.value.name, ty, *mutable, ownership, name.span);
                TypedStmtKind::Let { binding, init }
            }

            Stmt::Assign { target, value } => self.check_assign(target, value)?,

            Stmt::Expr(expr) => TypedStmtKind::Expr(self.check_expr(expr)?),

            Stmt::Print(expr) => {
                let expr = self.check_expr(expr)?;
                self.check_printable(&expr)?;
                TypedStmtKind::Print(expr)
            }

            Stmt::Return(value) => {
                let ret = self.sig.ret.clone();
                match value {
                    Some(value) => {
                        let value = self.check_expr(value)?;
                        self.subtype(&value.ty, &ret, value.span)?;
                        TypedStmtKind::Return(Some(value))
                    }
                    None if ret == Type::UNIT => TypedStmtKind::Return(None),
                    None => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            span,
                            format!("`return` without a value in a function returning `{}`", ret),
                        )
                        .with_note(self.sig.span, "return type declared here")
                        .into())
                    }
                }
            }

            Stmt::If { cond, then_block, else_block } => {
                let cond = self.check_expr(cond)?;
                self.equal(&Type::BOOL, &cond.ty, cond.span)?;
                let guard = guard(&cond);
                let before = self.narrowed.clone();

                if let Some(Guard { binding, then_refines: true }) = &guard {
                    self.refine(*binding);
                }
                let then_block = self.check_block(then_block)?;
                let then_state = self.narrowed.clone();

                self.restore(&before);
                if let Some(Guard { binding, then_refines: false }) = &guard {
                    self.refine(*binding);
                }
                let else_block = match else_block {
                    Some(block) => Some(self.check_block(block)?),
                    None => None,
                };
                let else_state = self.narrowed.clone();

                let then_falls = !then_block.diverges();
                let else_falls = !else_block.as_ref().map_or(false, TypedBlock::diverges);
                match (then_falls, else_falls) {
                    (true, true) => {
                        let merged = merge(&then_state, &else_state);
                        self.restore(&merged);
                    }
                    (true, false) => self.restore(&then_state),
                    (false, true) => self.restore(&else_state),
                    (false, false) => self.restore(&before),
                }

                TypedStmtKind::If { cond, then_block, else_block, then_drops: Vec::new(), else_drops: Vec::new() }
            }

            Stmt::While { cond, body } => {
                let mut assigned = HashSet::new();
                assigned_names(&body.value, &mut assigned);
                for name in &assigned {
                    if let Some(binding) = self.env.lookup(name) {
                        self.narrowed[binding as usize] = None;
                    }
                }
                let entry = self.narrowed.clone();

                let cond = self.check_expr(cond)?;
                self.equal(&Type::BOOL, &cond.ty, cond.span)?;

                self.loop_depth += 1;
                let body = self.check_block(body);
                self.loop_depth -= 1;
                let body = body?;

                self.restore(&entry);
                TypedStmtKind::While { cond, body, exit_drops: Vec::new() }
            }

            Stmt::Break | Stmt::Continue if self.loop_depth == 0 => {
                let keyword = if matches!(stmt.value, Stmt::Break) { "break" } else { "continue" };
                return Err(Diagnostic::new(
                    DiagnosticKind::InvalidControlFlow,
                    span,
                    format!("`{}` outside of a loop", keyword),
                )
                .into());
            }
            Stmt::Break => TypedStmtKind::Break { drops: Vec::new() },
            Stmt::Continue => TypedStmtKind::Continue,

            Stmt::Block(block) => TypedStmtKind::Block(self.check_block(block)?),
        };
        Ok(TypedStmt { kind, span })
    }

    fn check_assign(&mut self, target: &Node<Expr>, value: &Node<Expr>) -> Result<TypedStmtKind, Abort> {
        match &target.value {
            Expr::Ident(ident) => {
                let Some(binding) = self.env.lookup(&ident.name) else {
                    return Err(Diagnostic::new(
                        DiagnosticKind::UnresolvedVariable,
                        target.span,
                        format!("cannot find value `{}` in this scope", ident),
                    )
                    .into());
                };
                let value = self.check_expr(value)?;
                let declared = self.bindings[binding as usize].ty.clone();
                self.subtype(&value.ty, &declared, value.span)?;

                // A possibly-null value undoes an earlier guard.
                let assigned = self.solver.apply(&value.ty);
                if matches!(assigned, Type::Primitive(PrimitiveKind::Null) | Type::Nullable(_) | Type::Var(_)) {
                    self.narrowed[binding as usize] = None;
                }
                Ok(TypedStmtKind::Assign { binding, value })
            }
            Expr::Field { object, field } => {
                let object = self.check_expr(object)?;
                if object.place_root().is_none() {
                    return Err(Diagnostic::new(
                        DiagnosticKind::ImmutableAssignment,
                        target.span,
                        "cannot assign to a field of a temporary value",
                    )
                    .into());
                }
                let (def, index) = self.field_of(&object, field)?;
                let value = self.check_expr(value)?;
                self.subtype(&value.ty, &def.fields[index].ty, value.span)?;
                Ok(TypedStmtKind::FieldAssign {
                    object,
                    struct_name: def.name.clone(),
                    index,
                    field: field.value.name.clone(),
                    value,
                })
            }
            _ => Err(Diagnostic::new(
                DiagnosticKind::ImmutableAssignment,
                target.span,
                "invalid assignment target; expected a variable or a field",
            )
            .into()),
        }
    }

    fn check_printable(&mut self, expr: &TypedExpr) -> Result<(), Abort> {
        let ty = self.solver.apply(&expr.ty);
        let printable = match &ty {
            Type::Primitive(_) => true,
            Type::Nullable(inner) => matches!(**inner, Type::Primitive(_)),
            Type::Var(_) => {
                return Err(Diagnostic::new(
                    DiagnosticKind::AmbiguousType,
                    expr.span,
                    "the type of a printed value must be known",
                )
                .into())
            }
            _ => false,
        };
        if printable {
            Ok(())
        } else {
            Err(Diagnostic::new(
                DiagnosticKind::NotPrintable,
                expr.span,
                format!("values of type `{}` cannot be printed", ty),
            )
            .into())
        }
    }

    // =========================================================================
    // Narrowing
    // =========================================================================

    fn refine(&mut self, binding: BindingId) {
        let current = self.effective_type(binding);
        if let Type::Nullable(inner) = self.solver.apply(&current) {
            self.narrowed[binding as usize] = Some(*inner);
        }
    }

    /// Reset narrowing to a snapshot; bindings declared after it are unrefined
    fn restore(&mut self, state: &[Option<Type>]) {
        for (i, slot) in self.narrowed.iter_mut().enumerate() {
            *slot = state.get(i).cloned().flatten();
        }
    }
}

fn guard(cond: &TypedExpr) -> Option<Guard> {
    let TypedExprKind::Binary { op, left, right, .. } = &cond.kind else {
        return None;
    };
    let then_refines = match op {
        BinaryOp::Ne => true,
        BinaryOp::Eq => false,
        _ => return None,
    };
    let local = match (&left.kind, &right.kind) {
        (TypedExprKind::Local { binding, .. }, TypedExprKind::Literal(Literal::Null))
        | (TypedExprKind::Literal(Literal::Null), TypedExprKind::Local { binding, .. }) => *binding,
        _ => return None,
    };
    Some(Guard { binding: local, then_refines })
}

/// Keep a refinement only where both paths agree
fn merge(a: &Narrowing, b: &Narrowing) -> Narrowing {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| if x == y { x.clone() } else { None })
        .collect()
}

/// Names assigned anywhere in a loop body, nested blocks included
fn assigned_names(block: &Block, out: &mut HashSet<String>) {
    for stmt in &block.stmts {
        match &stmt.value {
            Stmt::Assign { target, .. } => {
                if let Expr::Ident(ident) = &target.value {
                    out.insert(ident.name.clone());
                }
            }
            Stmt::If { then_block, else_block, .. } => {
                assigned_names(&then_block.value, out);
                if let Some(block) = else_block {
                    assigned_names(&block.value, out);
                }
            }
            Stmt::While { body, .. } => assigned_names(&body.value, out),
            Stmt::Block(block) => assigned_names(&block.value, out),
            _ => {}
        }
    }
}
