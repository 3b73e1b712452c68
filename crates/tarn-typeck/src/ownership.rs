//! Ownership and borrow checking over a typed function.
//!
//! Tracks an [`OwnershipState`] per binding through the body, annotates every
//! local use with its [`Usage`], and records the drops each control-flow
//! path needs so that all paths reaching a merge point own the same set of
//! bindings.

use std::collections::{HashMap, HashSet};

use tarn_ast::{OwnershipKind, Span};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::symbols::SymbolTable;
use crate::typed_ast::{Binding, BindingId, TypedBlock, TypedExpr, TypedExprKind, TypedFunction, TypedStmt, TypedStmtKind, Usage};
use crate::types::{QualifiedName, StructLookup};

#[derive(Debug, Clone, PartialEq)]
pub enum OwnershipState {
    Owned,
    Moved { at: Span },
    /// Number of live shared borrows
    BorrowedShared(u32),
    BorrowedMut,
}

impl OwnershipState {
    fn is_moved(&self) -> bool {
        matches!(self, OwnershipState::Moved { .. })
    }

    /// Equal up to the location of a move
    fn same(&self, other: &OwnershipState) -> bool {
        (self.is_moved() && other.is_moved()) || self == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Move,
    Read,
}

struct LoopFrame {
    entry: Vec<OwnershipState>,
    /// Bindings with smaller ids were declared outside the loop
    outer: usize,
    breaks: Vec<Vec<OwnershipState>>,
    reported: HashSet<usize>,
}

/// Check one function, filling in use annotations and drop lists.
/// Returns every ownership diagnostic found, in source order.
pub(crate) fn check(func: &mut TypedFunction, symbols: &SymbolTable) -> Vec<Diagnostic> {
    let mut body = std::mem::take(&mut func.body);
    let mut pass = OwnershipPass {
        bindings: &func.bindings,
        symbols,
        state: vec![OwnershipState::Owned; func.bindings.len()],
        loans: HashMap::new(),
        scopes: Vec::new(),
        loops: Vec::new(),
        declared: func.params.len(),
        diagnostics: Vec::new(),
    };
    pass.block(&mut body);
    let diagnostics = pass.diagnostics;
    func.body = body;
    diagnostics
}

struct OwnershipPass<'a> {
    bindings: &'a [Binding],
    symbols: &'a SymbolTable,
    state: Vec<OwnershipState>,
    /// Borrower binding → (owner, mutable)
    loans: HashMap<BindingId, (BindingId, bool)>,
    scopes: Vec<Vec<BindingId>>,
    loops: Vec<LoopFrame>,
    /// Count of bindings declared so far in traversal order
    declared: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> OwnershipPass<'a> {
    fn binding(&self, id: BindingId) -> &'a Binding {
        &self.bindings[id as usize]
    }

    fn is_copy(&self, id: BindingId) -> bool {
        self.binding(id).ty.is_copy(self.symbols)
    }

    fn violation(&mut self, span: Span, message: String) {
        self.diagnostics.push(Diagnostic::new(DiagnosticKind::OwnershipViolation, span, message));
    }

    fn immutable(&mut self, span: Span, message: String) {
        self.diagnostics.push(Diagnostic::new(DiagnosticKind::ImmutableAssignment, span, message));
    }

    fn use_after_move(&mut self, id: BindingId, span: Span, moved_at: Span) {
        let name = &self.binding(id).name;
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::OwnershipViolation,
                span,
                format!("use of moved value `{}`", name),
            )
            .with_note(moved_at, "value moved here"),
        );
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn block(&mut self, block: &mut TypedBlock) {
        self.scopes.push(Vec::new());
        for stmt in &mut block.stmts {
            self.stmt(stmt);
            if stmt.diverges() {
                break;
            }
        }
        if let Some(scope) = self.scopes.pop() {
            for id in scope.into_iter().rev() {
                self.release(id);
            }
        }
    }

    fn release(&mut self, borrower: BindingId) {
        if let Some((owner, _)) = self.loans.remove(&borrower) {
            let next = match &self.state[owner as usize] {
                OwnershipState::BorrowedShared(n) if *n > 1 => OwnershipState::BorrowedShared(*n - 1),
                OwnershipState::BorrowedShared(_) | OwnershipState::BorrowedMut => OwnershipState::Owned,
                other => other.clone(),
            };
            self.state[owner as usize] = next;
        }
    }

    fn stmt(&mut self, stmt: &mut TypedStmt) {
        let span = stmt.span;
        match &mut stmt.kind {
            TypedStmtKind::Let { binding, init } => {
                let id = *binding;
                if let TypedExprKind::Borrow { mutable, ref mut place } = init.kind {
                    if let Some(owner) = self.lend(place, mutable) {
                        self.loans.insert(id, (owner, mutable));
                    }
                } else {
                    self.expr(init, Ctx::Move);
                }
                self.state[id as usize] = OwnershipState::Owned;
                self.declared = self.declared.max(id as usize + 1);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.push(id);
                }
            }

            TypedStmtKind::Assign { binding, value } => {
                let id = *binding;
                self.expr(value, Ctx::Move);
                let b = self.binding(id);
                if b.ownership != OwnershipKind::Owned {
                    self.immutable(span, format!("cannot assign to `{}`, which is a borrow", b.name));
                    return;
                }
                if !b.mutable {
                    self.immutable(span, format!("cannot assign twice to immutable binding `{}`", b.name));
                    return;
                }
                match self.state[id as usize] {
                    OwnershipState::BorrowedShared(_) | OwnershipState::BorrowedMut => {
                        self.violation(span, format!("cannot assign to `{}` while it is borrowed", b.name));
                    }
                    _ => self.state[id as usize] = OwnershipState::Owned,
                }
            }

            TypedStmtKind::FieldAssign { object, struct_name, field, value, .. } => {
                let moved_before = object.place_root().map_or(false, |root| self.state[root as usize].is_moved());
                self.expr(value, Ctx::Move);
                self.field_store(object, struct_name, field, !moved_before, span);
            }

            TypedStmtKind::Expr(e) | TypedStmtKind::Print(e) => self.expr(e, Ctx::Read),

            TypedStmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value, Ctx::Move);
                }
            }

            TypedStmtKind::If { cond, then_block, else_block, then_drops, else_drops } => {
                self.expr(cond, Ctx::Read);
                let limit = self.declared;
                let before = self.state.clone();

                self.block(then_block);
                let then_state = std::mem::replace(&mut self.state, before.clone());
                if let Some(block) = else_block.as_mut() {
                    self.block(block);
                }
                let else_state = std::mem::replace(&mut self.state, before.clone());

                let then_falls = !then_block.diverges();
                let else_falls = !else_block.as_ref().map_or(false, TypedBlock::diverges);
                let merged = match (then_falls, else_falls) {
                    (true, true) => merge(&[&then_state, &else_state]),
                    (true, false) => then_state.clone(),
                    (false, true) => else_state.clone(),
                    (false, false) => before,
                };
                if then_falls {
                    *then_drops = reconcile(&then_state, &merged, limit);
                }
                if else_falls {
                    *else_drops = reconcile(&else_state, &merged, limit);
                }
                self.state = merged;
            }

            TypedStmtKind::While { cond, body, exit_drops } => {
                let outer = self.declared;
                let entry = self.state.clone();
                self.expr(cond, Ctx::Read);
                let after_cond = self.state.clone();

                self.loops.push(LoopFrame { entry, outer, breaks: Vec::new(), reported: HashSet::new() });
                self.block(body);
                if !body.diverges() {
                    self.check_iteration();
                }
                let Some(frame) = self.loops.pop() else {
                    return;
                };

                let normal_exit = !cond.is_true_literal();
                let mut exits: Vec<&Vec<OwnershipState>> = Vec::new();
                if normal_exit {
                    exits.push(&after_cond);
                }
                exits.extend(frame.breaks.iter());
                let merged = if exits.is_empty() { frame.entry.clone() } else { merge(&exits) };

                if normal_exit {
                    *exit_drops = reconcile(&after_cond, &merged, outer);
                }
                let mut break_drops = frame.breaks.iter().map(|s| reconcile(s, &merged, outer)).collect::<Vec<_>>().into_iter();
                fill_breaks(body, &mut break_drops);
                self.state = merged;
            }

            TypedStmtKind::Break { .. } => {
                if let Some(frame) = self.loops.last_mut() {
                    frame.breaks.push(self.state.clone());
                }
            }

            TypedStmtKind::Continue => self.check_iteration(),

            TypedStmtKind::Block(block) => self.block(block),
        }
    }

    /// Outer bindings must be in their loop-entry state whenever control
    /// returns to the loop head.
    fn check_iteration(&mut self) {
        let Some(frame) = self.loops.last_mut() else {
            return;
        };
        for id in 0..frame.outer {
            let now = &self.state[id];
            if now.same(&frame.entry[id]) || !frame.reported.insert(id) {
                continue;
            }
            let binding = &self.bindings[id];
            let diagnostic = match now {
                OwnershipState::Moved { at } => Diagnostic::new(
                    DiagnosticKind::OwnershipViolation,
                    *at,
                    format!("`{}` is moved in a previous iteration of the loop", binding.name),
                )
                .with_note(binding.span, "declared outside the loop here"),
                _ => Diagnostic::new(
                    DiagnosticKind::OwnershipViolation,
                    binding.span,
                    format!("`{}` was moved before the loop and is re-initialized inside it", binding.name),
                ),
            };
            self.diagnostics.push(diagnostic);
        }
    }

    /// Runs after the stored value is checked. `fresh` is set when the root
    /// was not moved before the value, so a move found now came from it.
    fn field_store(&mut self, object: &mut TypedExpr, struct_name: &QualifiedName, field: &str, fresh: bool, span: Span) {
        if self.symbols.struct_def(struct_name).map_or(false, |def| def.copy) {
            self.immutable(span, format!("field `{}` of copy struct `{}` cannot be assigned", field, struct_name.name));
        }
        let Some(root) = object.place_root() else {
            self.expr(object, Ctx::Read);
            return;
        };
        annotate_root(object, if self.is_copy(root) { Usage::Copy } else { Usage::Read });
        let b = self.binding(root);
        let writable = (b.ownership == OwnershipKind::Owned && b.mutable) || b.ownership == OwnershipKind::Mut;
        if !writable {
            self.immutable(span, format!("cannot assign to a field of `{}`, which is not mutable", b.name));
        }
        match self.state[root as usize].clone() {
            OwnershipState::Moved { at } if fresh => self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::OwnershipViolation,
                    span,
                    format!("cannot store `{}` inside itself", b.name),
                )
                .with_note(at, "moved into the field here"),
            ),
            OwnershipState::Moved { at } => self.use_after_move(root, object.span, at),
            OwnershipState::BorrowedShared(_) | OwnershipState::BorrowedMut => {
                self.violation(span, format!("cannot assign to a field of `{}` while it is borrowed", b.name));
            }
            OwnershipState::Owned => {}
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr(&mut self, expr: &mut TypedExpr, ctx: Ctx) {
        let span = expr.span;
        match &mut expr.kind {
            TypedExprKind::Literal(_) => {}

            TypedExprKind::Local { binding, usage } => *usage = self.local(*binding, ctx, span),

            TypedExprKind::Unary { operand, .. } => self.expr(operand, Ctx::Read),

            TypedExprKind::Binary { op, left, right, skip_drops } => {
                self.expr(left, Ctx::Read);
                if !op.is_logical() {
                    self.expr(right, Ctx::Read);
                    return;
                }
                // The right operand runs on one path only
                let skipped = self.state.clone();
                self.expr(right, Ctx::Read);
                let merged = merge(&[&self.state, &skipped]);
                *skip_drops = reconcile(&skipped, &merged, self.declared);
                self.state = merged;
            }

            TypedExprKind::Call { args, .. } => {
                let mut lent = Vec::new();
                for arg in args.iter_mut() {
                    if arg.ownership == OwnershipKind::Owned {
                        if matches!(arg.expr.kind, TypedExprKind::Borrow { .. }) {
                            self.violation(arg.expr.span, "a borrow can only be passed to a `shared` or `mut` parameter".to_string());
                            continue;
                        }
                        self.expr(&mut arg.expr, Ctx::Move);
                        continue;
                    }

                    let mutable = arg.ownership == OwnershipKind::Mut;
                    if let TypedExprKind::Borrow { mutable: false, .. } = arg.expr.kind {
                        if mutable {
                            self.violation(arg.expr.span, "this parameter needs a mutable borrow; write `&mut`".to_string());
                        }
                    }
                    let place = lent_place(&mut arg.expr);
                    if place.place_root().is_none() {
                        if !place.ty.is_copy(self.symbols) {
                            self.violation(place.span, "cannot lend a temporary value; bind it with `let` first".to_string());
                        }
                        self.expr(place, Ctx::Read);
                        continue;
                    }
                    if let Some(root) = place.place_root() {
                        let before = self.state[root as usize].clone();
                        if self.lend(place, mutable).is_some() {
                            lent.push((root, before));
                        }
                    }
                }
                for (root, before) in lent.into_iter().rev() {
                    self.state[root as usize] = before;
                }
            }

            TypedExprKind::StructLit { fields, .. } => {
                for (_, value) in fields {
                    self.expr(value, Ctx::Move);
                }
            }

            TypedExprKind::Field { object, name, .. } => {
                if ctx == Ctx::Move && !expr.ty.is_copy(self.symbols) {
                    self.violation(span, format!("cannot move out of field `{}`; clone it instead", name));
                }
                if object.place_root().is_none() && !object.ty.is_copy(self.symbols) {
                    self.violation(object.span, "cannot access a field of a temporary value; bind it with `let` first".to_string());
                }
                self.expr(object, Ctx::Read);
            }

            TypedExprKind::Borrow { place, .. } => {
                self.violation(span, "a borrow may only initialize a `let` binding or be passed to a borrowed parameter".to_string());
                self.expr(place, Ctx::Read);
            }

            TypedExprKind::Clone(inner) => {
                if inner.place_root().is_none() && !inner.ty.is_copy(self.symbols) {
                    self.violation(inner.span, "cloning a temporary value is redundant; use it directly".to_string());
                }
                self.expr(inner, Ctx::Read);
            }
        }
    }

    fn local(&mut self, id: BindingId, ctx: Ctx, span: Span) -> Usage {
        let state = self.state[id as usize].clone();
        if let OwnershipState::Moved { at } = state {
            self.use_after_move(id, span, at);
            return Usage::Read;
        }
        let b = self.binding(id);
        if self.is_copy(id) || ctx == Ctx::Read {
            if state == OwnershipState::BorrowedMut {
                self.violation(span, format!("cannot use `{}` while it is mutably borrowed", b.name));
            }
            return if self.is_copy(id) { Usage::Copy } else { Usage::Read };
        }

        if b.ownership != OwnershipKind::Owned {
            self.violation(span, format!("cannot move out of `{}`, which is a borrow", b.name));
            return Usage::Read;
        }
        match state {
            OwnershipState::BorrowedShared(_) | OwnershipState::BorrowedMut => {
                self.violation(span, format!("cannot move `{}` while it is borrowed", b.name));
                Usage::Read
            }
            _ => {
                self.state[id as usize] = OwnershipState::Moved { at: span };
                Usage::Move
            }
        }
    }

    /// Borrow the binding at the root of `place`; returns the owner on success
    fn lend(&mut self, place: &mut TypedExpr, mutable: bool) -> Option<BindingId> {
        let Some(root) = place.place_root() else {
            self.violation(place.span, "cannot borrow a temporary value".to_string());
            self.expr(place, Ctx::Read);
            return None;
        };
        annotate_root(place, Usage::Borrow);

        let b = self.binding(root);
        if mutable && !((b.mutable && b.ownership == OwnershipKind::Owned) || b.ownership == OwnershipKind::Mut) {
            self.violation(place.span, format!("cannot borrow `{}` as mutable; declare it with `let mut`", b.name));
            return None;
        }
        let next = match self.state[root as usize].clone() {
            OwnershipState::Moved { at } => {
                self.use_after_move(root, place.span, at);
                return None;
            }
            OwnershipState::BorrowedMut => {
                self.violation(place.span, format!("cannot borrow `{}`: it is already mutably borrowed", b.name));
                return None;
            }
            OwnershipState::BorrowedShared(_) if mutable => {
                self.violation(place.span, format!("cannot borrow `{}` as mutable: it is also borrowed as shared", b.name));
                return None;
            }
            OwnershipState::BorrowedShared(n) => OwnershipState::BorrowedShared(n + 1),
            OwnershipState::Owned if mutable => OwnershipState::BorrowedMut,
            OwnershipState::Owned => OwnershipState::BorrowedShared(1),
        };
        self.state[root as usize] = next;
        Some(root)
    }
}

/// The expression a borrowed argument lends: the place under an explicit
/// `&`/`&mut`, or the argument itself
fn lent_place(expr: &mut TypedExpr) -> &mut TypedExpr {
    match expr.kind {
        TypedExprKind::Borrow { ref mut place, .. } => place,
        _ => expr,
    }
}

fn annotate_root(place: &mut TypedExpr, root_usage: Usage) {
    match &mut place.kind {
        TypedExprKind::Local { usage, .. } => *usage = root_usage,
        TypedExprKind::Field { object, .. } => annotate_root(object, root_usage),
        _ => {}
    }
}

/// A binding moved on any incoming path is moved after the merge
fn merge(states: &[&Vec<OwnershipState>]) -> Vec<OwnershipState> {
    let mut merged = states[0].clone();
    for state in &states[1..] {
        for (m, s) in merged.iter_mut().zip(state.iter()) {
            if !m.is_moved() && s.is_moved() {
                *m = s.clone();
            }
        }
    }
    merged
}

/// Bindings this path still owns that are moved after the merge
fn reconcile(path: &[OwnershipState], merged: &[OwnershipState], limit: usize) -> Vec<BindingId> {
    (0..limit.min(path.len()))
        .filter(|&i| path[i] == OwnershipState::Owned && merged[i].is_moved())
        .map(|i| i as BindingId)
        .collect()
}

/// Hand out break drop lists in traversal order, skipping nested loops
fn fill_breaks(block: &mut TypedBlock, drops: &mut impl Iterator<Item = Vec<BindingId>>) {
    for stmt in &mut block.stmts {
        match &mut stmt.kind {
            TypedStmtKind::Break { drops: slot } => *slot = drops.next().unwrap_or_default(),
            TypedStmtKind::If { then_block, else_block, .. } => {
                fill_breaks(then_block, drops);
                if let Some(block) = else_block {
                    fill_breaks(block, drops);
                }
            }
            TypedStmtKind::Block(inner) => fill_breaks(inner, drops),
            _ => {}
        }
        if stmt.diverges() {
            break;
        }
    }
}
