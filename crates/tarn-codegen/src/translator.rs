//! Lowering of one checked function body to stack-machine code

use std::collections::HashMap;

use tarn_ast::{BinaryOp, Literal, OwnershipKind, Span, UnaryOp};
use tarn_bytecode::{Constant, Instruction, Opcode, Storage};
use tarn_typeck::{
    BindingId, PrimitiveKind, Type, TypedBlock, TypedExpr, TypedExprKind, TypedFunction, TypedStmt, TypedStmtKind,
    Usage,
};

use crate::error::CodegenError;
use crate::CodeGenerator;

/// Code and frame size of a translated function
pub(crate) struct Translated {
    pub code: Vec<Instruction>,
    pub spans: Vec<Span>,
    pub local_slots: u16,
}

/// Lexical scope: first slot it owns and the bindings it declared, in order
struct Scope {
    base: u16,
    bindings: Vec<BindingId>,
}

struct LoopLabels {
    head: u32,
    /// Scope depth outside the loop body
    depth: usize,
    /// `break` jumps waiting for the loop end
    breaks: Vec<usize>,
    /// Live set on every path leaving the loop
    exits: Vec<Vec<bool>>,
}

/// Context for translating a single function or instantiation
pub(crate) struct FunctionTranslator<'g, 'a> {
    gen: &'g mut CodeGenerator<'a>,
    func: &'a TypedFunction,
    /// Type parameter name → concrete type argument
    subst: HashMap<String, Type>,
    name: String,
    code: Vec<Instruction>,
    spans: Vec<Span>,
    slots: Vec<Option<u16>>,
    /// Binding holds a value that must be released at run time
    owned: Vec<bool>,
    /// Binding currently holds such a value
    live: Vec<bool>,
    scopes: Vec<Scope>,
    next_slot: u16,
    max_slots: u16,
    loops: Vec<LoopLabels>,
}

impl<'g, 'a> FunctionTranslator<'g, 'a> {
    pub(crate) fn new(
        gen: &'g mut CodeGenerator<'a>,
        func: &'a TypedFunction,
        subst: HashMap<String, Type>,
        name: String,
    ) -> Self {
        let owned = func
            .bindings
            .iter()
            .map(|b| b.ownership == OwnershipKind::Owned && gen.layouts.is_owned(&b.ty.substitute(&subst)))
            .collect();
        let count = func.bindings.len();
        Self {
            gen,
            func,
            subst,
            name,
            code: Vec::new(),
            spans: Vec::new(),
            slots: vec![None; count],
            owned,
            live: vec![false; count],
            scopes: Vec::new(),
            next_slot: 0,
            max_slots: 0,
            loops: Vec::new(),
        }
    }

    pub(crate) fn translate(mut self) -> Result<Translated, CodegenError> {
        let func = self.func;
        self.scopes.push(Scope { base: 0, bindings: Vec::new() });
        for &param in &func.params {
            self.declare(param)?;
            self.live[param as usize] = self.owned[param as usize];
        }

        self.block(&func.body)?;
        if !func.body.diverges() {
            let span = func.body.span;
            self.exit_scope(span)?;
            self.op(Opcode::PushUnit, span);
            self.op(Opcode::Return, span);
        }

        Ok(Translated { code: self.code, spans: self.spans, local_slots: self.max_slots })
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, ins: Instruction, span: Span) {
        self.code.push(ins);
        self.spans.push(span);
    }

    fn op(&mut self, op: Opcode, span: Span) {
        self.emit(Instruction::simple(op), span);
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Emit a jump with an unresolved target; returns its position
    fn jump(&mut self, op: Opcode, span: Span) -> usize {
        self.emit(Instruction::new(op, u32::MAX), span);
        self.code.len() - 1
    }

    /// Point a pending jump at the next instruction
    fn patch(&mut self, at: usize) {
        let target = self.here();
        self.code[at].a = target;
    }

    fn internal(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::Internal { function: self.name.clone(), message: message.into() }
    }

    fn constant(&mut self, constant: Constant, span: Span) {
        let index = self.gen.constants.add(constant);
        self.emit(Instruction::new(Opcode::PushConst, index), span);
    }

    // =========================================================================
    // Slots and drops
    // =========================================================================

    fn declare(&mut self, id: BindingId) -> Result<u16, CodegenError> {
        let slot = self.next_slot;
        self.next_slot = slot.checked_add(1).ok_or_else(|| CodegenError::OperandOverflow {
            what: "local slot count",
            function: self.name.clone(),
        })?;
        self.max_slots = self.max_slots.max(self.next_slot);
        self.slots[id as usize] = Some(slot);
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.push(id);
        }
        Ok(slot)
    }

    fn slot(&self, id: BindingId) -> Result<u16, CodegenError> {
        self.slots
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or_else(|| self.internal(format!("binding #{} used before its declaration", id)))
    }

    fn drop_binding(&mut self, id: BindingId, span: Span) -> Result<(), CodegenError> {
        if self.live[id as usize] {
            let slot = self.slot(id)?;
            self.emit(Instruction::new(Opcode::Drop, slot as u32), span);
            self.live[id as usize] = false;
        }
        Ok(())
    }

    /// Live owned bindings of `scopes[depth..]`, innermost scope first,
    /// each scope in reverse declaration order
    fn live_below(&self, depth: usize) -> Vec<BindingId> {
        self.scopes[depth..]
            .iter()
            .rev()
            .flat_map(|scope| scope.bindings.iter().rev())
            .copied()
            .filter(|id| self.live[*id as usize])
            .collect()
    }

    /// Drop everything declared in `scopes[depth..]` on a path that leaves
    /// them; the live set of the fall-through path is left untouched.
    fn drops_for_exit(&mut self, depth: usize, span: Span) -> Result<Vec<bool>, CodegenError> {
        let saved = self.live.clone();
        for id in self.live_below(depth) {
            self.drop_binding(id, span)?;
        }
        let after = std::mem::replace(&mut self.live, saved);
        Ok(after)
    }

    fn enter_scope(&mut self) {
        self.scopes.push(Scope { base: self.next_slot, bindings: Vec::new() });
    }

    fn exit_scope(&mut self, span: Span) -> Result<(), CodegenError> {
        let depth = self.scopes.len().saturating_sub(1);
        for id in self.live_below(depth) {
            self.drop_binding(id, span)?;
        }
        self.discard_scope();
        Ok(())
    }

    /// Pop a scope whose end is unreachable
    fn discard_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for id in scope.bindings {
                self.live[id as usize] = false;
            }
            self.next_slot = scope.base;
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn block(&mut self, block: &TypedBlock) -> Result<(), CodegenError> {
        self.enter_scope();
        let mut diverged = false;
        for stmt in &block.stmts {
            self.stmt(stmt)?;
            if stmt.diverges() {
                diverged = true;
                break;
            }
        }
        if diverged {
            self.discard_scope();
            Ok(())
        } else {
            self.exit_scope(block.span)
        }
    }

    fn stmt(&mut self, stmt: &TypedStmt) -> Result<(), CodegenError> {
        let span = stmt.span;
        match &stmt.kind {
            TypedStmtKind::Let { binding, init } => {
                self.expr(init)?;
                let slot = self.declare(*binding)?;
                self.emit(Instruction::new(Opcode::StoreLocal, slot as u32), span);
                self.live[*binding as usize] = self.owned[*binding as usize];
            }

            TypedStmtKind::Assign { binding, value } => {
                self.expr(value)?;
                self.drop_binding(*binding, span)?;
                let slot = self.slot(*binding)?;
                self.emit(Instruction::new(Opcode::StoreLocal, slot as u32), span);
                self.live[*binding as usize] = self.owned[*binding as usize];
            }

            TypedStmtKind::FieldAssign { object, index, value, .. } => {
                self.expr(object)?;
                self.expr(value)?;
                self.emit(Instruction::new(Opcode::StoreField, *index as u32), span);
            }

            TypedStmtKind::Expr(e) => {
                self.expr(e)?;
                let fresh = matches!(
                    e.kind,
                    TypedExprKind::Call { .. } | TypedExprKind::StructLit { .. } | TypedExprKind::Clone(_)
                );
                let op = if fresh && self.is_owned(&e.ty)? { Opcode::DropTop } else { Opcode::Pop };
                self.op(op, span);
            }

            TypedStmtKind::Print(e) => {
                self.expr(e)?;
                self.op(Opcode::Print, span);
            }

            TypedStmtKind::Return(value) => {
                match value {
                    Some(e) => self.expr(e)?,
                    None => self.op(Opcode::PushUnit, span),
                }
                self.drops_for_exit(0, span)?;
                self.op(Opcode::Return, span);
            }

            TypedStmtKind::If { cond, then_block, else_block, then_drops, else_drops } => {
                self.expr(cond)?;
                let to_else = self.jump(Opcode::JumpIfFalse, span);
                let before = self.live.clone();
                let else_code = else_block.is_some() || !else_drops.is_empty();
                let mut merged = Vec::new();

                self.block(then_block)?;
                let mut to_end = None;
                if !then_block.diverges() {
                    for id in then_drops {
                        self.drop_binding(*id, span)?;
                    }
                    merged.push(self.live.clone());
                    if else_code {
                        to_end = Some(self.jump(Opcode::Jump, span));
                    }
                }

                self.patch(to_else);
                self.live = before.clone();
                if let Some(block) = else_block {
                    self.block(block)?;
                }
                if !else_block.as_ref().map_or(false, TypedBlock::diverges) {
                    for id in else_drops {
                        self.drop_binding(*id, span)?;
                    }
                    merged.push(self.live.clone());
                }
                if let Some(at) = to_end {
                    self.patch(at);
                }
                self.live = meet(merged).unwrap_or(before);
            }

            TypedStmtKind::While { cond, body, exit_drops } => {
                let entry = self.live.clone();
                let head = self.here();
                let exit_test = if cond.is_true_literal() {
                    None
                } else {
                    self.expr(cond)?;
                    Some(self.jump(Opcode::JumpIfFalse, span))
                };

                self.loops.push(LoopLabels { head, depth: self.scopes.len(), breaks: Vec::new(), exits: Vec::new() });
                self.block(body)?;
                if !body.diverges() {
                    self.emit(Instruction::new(Opcode::Jump, head), span);
                }
                let labels = self.loops.pop().ok_or_else(|| self.internal("loop stack underflow"))?;

                let mut exits = labels.exits;
                if let Some(at) = exit_test {
                    self.patch(at);
                    self.live = entry.clone();
                    for id in exit_drops {
                        self.drop_binding(*id, span)?;
                    }
                    exits.push(self.live.clone());
                }
                for at in labels.breaks {
                    self.patch(at);
                }
                self.live = meet(exits).unwrap_or(entry);
            }

            TypedStmtKind::Break { drops } => {
                let depth = self.loops.last().map(|l| l.depth).ok_or_else(|| self.internal("`break` outside a loop"))?;
                let saved = self.live.clone();
                self.live = self.drops_for_exit(depth, span)?;
                for id in drops {
                    self.drop_binding(*id, span)?;
                }
                let exit = std::mem::replace(&mut self.live, saved);
                let at = self.jump(Opcode::Jump, span);
                if let Some(labels) = self.loops.last_mut() {
                    labels.breaks.push(at);
                    labels.exits.push(exit);
                }
            }

            TypedStmtKind::Continue => {
                let (depth, head) = self
                    .loops
                    .last()
                    .map(|l| (l.depth, l.head))
                    .ok_or_else(|| self.internal("`continue` outside a loop"))?;
                self.drops_for_exit(depth, span)?;
                self.emit(Instruction::new(Opcode::Jump, head), span);
            }

            TypedStmtKind::Block(block) => self.block(block)?,
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Apply the instantiation's type arguments
    fn concrete(&self, ty: &Type) -> Result<Type, CodegenError> {
        let ty = ty.substitute(&self.subst);
        if ty.has_generics() || ty.has_vars() {
            return Err(self.internal(format!("type `{}` is not concrete", ty)));
        }
        Ok(ty)
    }

    fn is_owned(&self, ty: &Type) -> Result<bool, CodegenError> {
        Ok(self.gen.layouts.is_owned(&self.concrete(ty)?))
    }

    fn primitive(&self, ty: &Type) -> Result<PrimitiveKind, CodegenError> {
        match self.concrete(ty)? {
            Type::Primitive(kind) => Ok(kind),
            other => Err(self.internal(format!("operator applied to `{}`", other))),
        }
    }

    fn expr(&mut self, expr: &TypedExpr) -> Result<(), CodegenError> {
        let span = expr.span;
        match &expr.kind {
            TypedExprKind::Literal(lit) => match lit {
                Literal::Int(v) => self.constant(Constant::Int(*v), span),
                Literal::Float(v) => self.constant(Constant::Float(*v), span),
                Literal::Str(s) => self.constant(Constant::Str(s.clone()), span),
                Literal::Bool(true) => self.op(Opcode::PushTrue, span),
                Literal::Bool(false) => self.op(Opcode::PushFalse, span),
                Literal::Null => self.op(Opcode::PushNull, span),
                Literal::Unit => self.op(Opcode::PushUnit, span),
            },

            TypedExprKind::Local { binding, usage } => {
                let slot = self.slot(*binding)?;
                self.emit(Instruction::new(Opcode::LoadLocal, slot as u32), span);
                if *usage == Usage::Move {
                    self.live[*binding as usize] = false;
                }
            }

            TypedExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                let code = match (op, self.primitive(&operand.ty)?) {
                    (UnaryOp::Not, _) => Opcode::Not,
                    (UnaryOp::Neg, PrimitiveKind::Int) => Opcode::NegInt,
                    (UnaryOp::Neg, PrimitiveKind::Float) => Opcode::NegFloat,
                    (UnaryOp::Neg, kind) => return Err(self.internal(format!("negation of `{}`", kind.name()))),
                };
                self.op(code, span);
            }

            TypedExprKind::Binary { op, left, right, skip_drops } => self.binary(*op, left, right, skip_drops, span)?,

            TypedExprKind::Call { function, type_args, args } => {
                let type_args = type_args.iter().map(|t| self.concrete(t)).collect::<Result<Vec<_>, _>>()?;
                let index = self.gen.resolve_call(function, type_args, &self.name)?;
                for arg in args {
                    self.expr(&arg.expr)?;
                }
                let argc = u16::try_from(args.len()).map_err(|_| CodegenError::OperandOverflow {
                    what: "argument count",
                    function: self.name.clone(),
                })?;
                self.emit(Instruction::call(index, argc), span);
            }

            TypedExprKind::StructLit { name, fields } => {
                for (_, value) in fields {
                    self.expr(value)?;
                }
                let (index, storage) = self
                    .gen
                    .type_constant(name)
                    .ok_or_else(|| self.internal(format!("no layout for struct `{}`", name)))?;
                let op = match storage {
                    Storage::Heap => Opcode::Alloc,
                    Storage::Inline => Opcode::MakeStruct,
                };
                self.emit(Instruction::new(op, index), span);
            }

            TypedExprKind::Field { object, index, .. } => {
                self.expr(object)?;
                self.emit(Instruction::new(Opcode::LoadField, *index as u32), span);
            }

            TypedExprKind::Borrow { place, .. } => self.expr(place)?,

            TypedExprKind::Clone(inner) => {
                self.expr(inner)?;
                self.op(Opcode::Clone, span);
            }
        }
        Ok(())
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &TypedExpr,
        right: &TypedExpr,
        skip_drops: &[BindingId],
        span: Span,
    ) -> Result<(), CodegenError> {
        match op {
            // The skipped path releases what the right operand would move
            BinaryOp::And => {
                self.expr(left)?;
                let short = self.jump(Opcode::JumpIfFalse, span);
                let before = self.live.clone();
                self.expr(right)?;
                let ran = std::mem::replace(&mut self.live, before);
                let end = self.jump(Opcode::Jump, span);
                self.patch(short);
                for id in skip_drops {
                    self.drop_binding(*id, span)?;
                }
                self.op(Opcode::PushFalse, span);
                self.patch(end);
                self.live = meet(vec![ran, self.live.clone()]).unwrap_or_default();
            }
            BinaryOp::Or => {
                self.expr(left)?;
                let rhs = self.jump(Opcode::JumpIfFalse, span);
                let before = self.live.clone();
                for id in skip_drops {
                    self.drop_binding(*id, span)?;
                }
                self.op(Opcode::PushTrue, span);
                let end = self.jump(Opcode::Jump, span);
                let skipped = std::mem::replace(&mut self.live, before);
                self.patch(rhs);
                self.expr(right)?;
                self.patch(end);
                self.live = meet(vec![skipped, self.live.clone()]).unwrap_or_default();
            }
            BinaryOp::Eq | BinaryOp::Ne if is_null(left) || is_null(right) => {
                let tested = if is_null(left) { right } else { left };
                self.expr(tested)?;
                self.op(Opcode::IsNull, span);
                if op == BinaryOp::Ne {
                    self.op(Opcode::Not, span);
                }
            }
            _ => {
                self.expr(left)?;
                self.expr(right)?;
                let kind = self.primitive(&left.ty)?;
                let code = binary_opcode(op, kind)
                    .ok_or_else(|| self.internal(format!("`{}` is not defined on `{}`", op, kind.name())))?;
                self.op(code, span);
            }
        }
        Ok(())
    }
}

fn is_null(expr: &TypedExpr) -> bool {
    matches!(expr.kind, TypedExprKind::Literal(Literal::Null))
}

/// Bindings live on every incoming path
fn meet(paths: Vec<Vec<bool>>) -> Option<Vec<bool>> {
    paths.into_iter().reduce(|acc, path| acc.iter().zip(&path).map(|(a, b)| *a && *b).collect())
}

fn binary_opcode(op: BinaryOp, kind: PrimitiveKind) -> Option<Opcode> {
    use BinaryOp::*;
    use PrimitiveKind::{Bool, Float, Int, Str};
    let code = match (kind, op) {
        (Int, Add) => Opcode::AddInt,
        (Int, Sub) => Opcode::SubInt,
        (Int, Mul) => Opcode::MulInt,
        (Int, Div) => Opcode::DivInt,
        (Int, Rem) => Opcode::RemInt,
        (Int, Eq) => Opcode::EqInt,
        (Int, Ne) => Opcode::NeInt,
        (Int, Lt) => Opcode::LtInt,
        (Int, Le) => Opcode::LeInt,
        (Int, Gt) => Opcode::GtInt,
        (Int, Ge) => Opcode::GeInt,
        (Float, Add) => Opcode::AddFloat,
        (Float, Sub) => Opcode::SubFloat,
        (Float, Mul) => Opcode::MulFloat,
        (Float, Div) => Opcode::DivFloat,
        (Float, Rem) => Opcode::RemFloat,
        (Float, Eq) => Opcode::EqFloat,
        (Float, Ne) => Opcode::NeFloat,
        (Float, Lt) => Opcode::LtFloat,
        (Float, Le) => Opcode::LeFloat,
        (Float, Gt) => Opcode::GtFloat,
        (Float, Ge) => Opcode::GeFloat,
        (Str, Add) => Opcode::Concat,
        (Str, Eq) => Opcode::EqStr,
        (Str, Ne) => Opcode::NeStr,
        (Bool, Eq) => Opcode::EqBool,
        (Bool, Ne) => Opcode::NeBool,
        _ => return None,
    };
    Some(code)
}
