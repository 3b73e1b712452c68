//! Expression inference

use std::collections::HashMap;

use tarn_ast::{BinaryOp, Expr, FieldInit, Ident, Literal, Node, TypeExpr, UnaryOp};

use crate::checker::FnChecker;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::resolve::Abort;
use crate::typed_ast::{TypedArg, TypedExpr, TypedExprKind, Usage};
use crate::types::{Capability, PrimitiveKind, QualifiedName, StructDef, StructLookup, Type};
use crate::unify::CapabilityReason;

impl<'a> FnChecker<'a> {
    pub(crate) fn check_expr(&mut self, expr: &Node<Expr>) -> Result<TypedExpr, Abort> {
        let span = expr.span;
        let (kind, ty) = match &expr.value {
            Expr::Literal(lit) => (TypedExprKind::Literal(lit.clone()), literal_type(lit)),

            Expr::Ident(ident) => return self.check_ident(ident, span),

            Expr::Unary { op, operand } => {
                let operand = self.check_expr(operand)?;
                let ty = match op {
                    UnaryOp::Neg => {
                        self.capability(&operand.ty, Capability::Num, CapabilityReason::Operator("-"), span)?;
                        operand.ty.clone()
                    }
                    UnaryOp::Not => {
                        self.equal(&Type::BOOL, &operand.ty, operand.span)?;
                        Type::BOOL
                    }
                };
                (TypedExprKind::Unary { op: *op, operand: Box::new(operand) }, ty)
            }

            Expr::Binary { op, left, right } => return self.check_binary(*op, left, right, span),

            Expr::Call { callee, type_args, args } => return self.check_call(callee, type_args, args, span),

            Expr::StructLit { name, fields } => return self.check_struct_lit(name, fields, span),

            Expr::Field { object, field } => {
                let object = self.check_expr(object)?;
                let (def, index) = self.field_of(&object, field)?;
                let ty = def.fields[index].ty.clone();
                (
                    TypedExprKind::Field {
                        object: Box::new(object),
                        struct_name: def.name.clone(),
                        index,
                        name: field.value.name.clone(),
                    },
                    ty,
                )
            }

            Expr::Borrow { mutable, place } => {
                if !matches!(place.value, Expr::Ident(_) | Expr::Field { .. }) {
                    return Err(Diagnostic::new(
                        DiagnosticKind::OwnershipViolation,
                        place.span,
                        "only variables and their fields can be borrowed",
                    )
                    .into());
                }
                let place = self.check_expr(place)?;
                let ty = place.ty.clone();
                (TypedExprKind::Borrow { mutable: *mutable, place: Box::new(place) }, ty)
            }

            Expr::Clone(inner) => {
                let inner = self.check_expr(inner)?;
                let ty = inner.ty.clone();
                (TypedExprKind::Clone(Box::new(inner)), ty)
            }
        };
        Ok(TypedExpr { kind, ty, span })
    }

    fn check_ident(&mut self, ident: &Ident, span: tarn_ast::Span) -> Result<TypedExpr, Abort> {
        if let Some(binding) = self.env.lookup(&ident.name) {
            return Ok(TypedExpr {
                kind: TypedExprKind::Local { binding, usage: Usage::Read },
                ty: self.effective_type(binding),
                span,
            });
        }
        if self.resolver.is_function(ident) {
            return Err(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                span,
                format!("function `{}` is not a value; call it instead", ident),
            )
            .into());
        }
        Err(Diagnostic::new(
            DiagnosticKind::UnresolvedVariable,
            span,
            format!("cannot find value `{}` in this scope", ident),
        )
        .into())
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &Node<Expr>,
        right: &Node<Expr>,
        span: tarn_ast::Span,
    ) -> Result<TypedExpr, Abort> {
        let l = self.check_expr(left)?;
        let r = self.check_expr(right)?;

        let ty = match op {
            BinaryOp::And | BinaryOp::Or => {
                self.equal(&Type::BOOL, &l.ty, l.span)?;
                self.equal(&Type::BOOL, &r.ty, r.span)?;
                Type::BOOL
            }
            BinaryOp::Eq | BinaryOp::Ne if is_null_literal(&l) || is_null_literal(&r) => {
                let other = if is_null_literal(&l) { &r } else { &l };
                let resolved = self.solver.apply(&other.ty);
                match resolved {
                    Type::Var(_) => self.subtype(&Type::NULL, &other.ty, span)?,
                    Type::Nullable(_) | Type::Primitive(PrimitiveKind::Null) => {}
                    _ => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            span,
                            format!("`{}` is never null; the comparison is always {}", resolved, op == BinaryOp::Ne),
                        )
                        .into())
                    }
                }
                Type::BOOL
            }
            _ => {
                let (cap, symbol) = operator_capability(op);
                self.capability(&l.ty, cap, CapabilityReason::Operator(symbol), l.span)?;
                self.capability(&r.ty, cap, CapabilityReason::Operator(symbol), r.span)?;
                self.equal(&l.ty, &r.ty, span)?;
                if op.is_comparison() {
                    Type::BOOL
                } else {
                    l.ty.clone()
                }
            }
        };

        Ok(TypedExpr {
            kind: TypedExprKind::Binary { op, left: Box::new(l), right: Box::new(r), skip_drops: Vec::new() },
            ty,
            span,
        })
    }

    fn check_call(
        &mut self,
        callee: &Node<Ident>,
        type_args: &[Node<TypeExpr>],
        args: &[Node<Expr>],
        span: tarn_ast::Span,
    ) -> Result<TypedExpr, Abort> {
        let sig = self.resolver.resolve_function(callee)?;

        if args.len() != sig.params.len() {
            return Err(Diagnostic::new(
                DiagnosticKind::ArityMismatch,
                span,
                format!(
                    "function `{}` takes {} argument(s) but {} were supplied",
                    sig.name.name,
                    sig.params.len(),
                    args.len()
                ),
            )
            .with_note(sig.span, "declared here")
            .into());
        }
        if !type_args.is_empty() && type_args.len() != sig.type_params.len() {
            return Err(Diagnostic::new(
                DiagnosticKind::ArityMismatch,
                span,
                format!(
                    "function `{}` takes {} type argument(s) but {} were supplied",
                    sig.name.name,
                    sig.type_params.len(),
                    type_args.len()
                ),
            )
            .with_note(sig.span, "declared here")
            .into());
        }

        let generics = self.sig.type_params.clone();
        let mut instance = HashMap::new();
        let mut vars = Vec::new();
        for (i, tp) in sig.type_params.iter().enumerate() {
            let var = self.solver.fresh();
            if let Some(hint) = type_args.get(i) {
                let hinted = self.resolver.resolve_type(hint, &generics)?;
                self.equal(&hinted, &var, hint.span)?;
            }
            instance.insert(tp.name.clone(), var.clone());
            vars.push(var);
        }

        let mut typed_args = Vec::new();
        for (arg, param) in args.iter().zip(&sig.params) {
            let typed = self.check_expr(arg)?;
            let expected = param.ty.substitute(&instance);
            self.subtype(&typed.ty, &expected, arg.span)?;
            typed_args.push(TypedArg { expr: typed, ownership: param.ownership });
        }

        for (tp, var) in sig.type_params.iter().zip(&vars) {
            for cap in &tp.bounds {
                let reason = CapabilityReason::Bound { param: tp.name.clone() };
                self.capability(var, *cap, reason, callee.span)?;
            }
        }

        Ok(TypedExpr {
            kind: TypedExprKind::Call { function: sig.name.clone(), type_args: vars, args: typed_args },
            ty: sig.ret.substitute(&instance),
            span,
        })
    }

    fn check_struct_lit(
        &mut self,
        name: &Node<Ident>,
        fields: &[FieldInit],
        span: tarn_ast::Span,
    ) -> Result<TypedExpr, Abort> {
        let def = self.resolver.resolve_struct(name)?;
        let mut slots: Vec<Option<(String, TypedExpr)>> = vec![None; def.fields.len()];

        for init in fields {
            let Some((index, field)) = def.field(&init.name.value.name) else {
                return Err(Diagnostic::new(
                    DiagnosticKind::UnknownField,
                    init.name.span,
                    format!("struct `{}` has no field `{}`", def.name.name, init.name.value),
                )
                .into());
            };
            if slots[index].is_some() {
                return Err(Diagnostic::new(
                    DiagnosticKind::DuplicateDefinition,
                    init.name.span,
                    format!("field `{}` is initialized twice", init.name.value),
                )
                .into());
            }
            let value = self.check_expr(&init.value)?;
            self.subtype(&value.ty, &field.ty, init.value.span)?;
            slots[index] = Some((field.name.clone(), value));
        }

        let mut ordered = Vec::with_capacity(slots.len());
        for (slot, field) in slots.into_iter().zip(&def.fields) {
            match slot {
                Some(entry) => ordered.push(entry),
                None => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::UnknownField,
                        span,
                        format!("missing field `{}` in initializer of `{}`", field.name, def.name.name),
                    )
                    .with_note(def.span, "struct declared here")
                    .into())
                }
            }
        }

        Ok(TypedExpr {
            kind: TypedExprKind::StructLit { name: def.name.clone(), fields: ordered },
            ty: Type::Struct(def.name.clone()),
            span,
        })
    }

    /// Resolve `object.field` to the struct definition and field index
    pub(crate) fn field_of(&mut self, object: &TypedExpr, field: &Node<Ident>) -> Result<(&'a StructDef, usize), Abort> {
        let ty = self.solver.apply(&object.ty);
        let name: QualifiedName = match &ty {
            Type::Struct(name) => name.clone(),
            Type::Nullable(_) | Type::Primitive(PrimitiveKind::Null) => {
                return Err(Diagnostic::new(
                    DiagnosticKind::NullabilityViolation,
                    object.span,
                    format!("cannot access field `{}` of `{}`, which may be null", field.value, ty),
                )
                .into())
            }
            Type::Var(_) => {
                return Err(Diagnostic::new(
                    DiagnosticKind::AmbiguousType,
                    object.span,
                    "the type of this expression must be known before accessing a field",
                )
                .into())
            }
            other => {
                return Err(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    field.span,
                    format!("`{}` has no field `{}`", other, field.value),
                )
                .into())
            }
        };
        let symbols = self.resolver.symbols;
        let def = symbols.struct_def(&name).ok_or_else(|| {
            Diagnostic::new(DiagnosticKind::UnresolvedType, object.span, format!("cannot find struct `{}`", name))
        })?;
        match def.field(&field.value.name) {
            Some((index, _)) => Ok((def, index)),
            None => Err(Diagnostic::new(
                DiagnosticKind::UnknownField,
                field.span,
                format!("struct `{}` has no field `{}`", def.name.name, field.value),
            )
            .with_note(def.span, "struct declared here")
            .into()),
        }
    }
}

fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::INT,
        Literal::Float(_) => Type::FLOAT,
        Literal::Bool(_) => Type::BOOL,
        Literal::Str(_) => Type::STR,
        Literal::Null => Type::NULL,
        Literal::Unit => Type::UNIT,
    }
}

fn is_null_literal(expr: &TypedExpr) -> bool {
    matches!(expr.kind, TypedExprKind::Literal(Literal::Null))
}

fn operator_capability(op: BinaryOp) -> (Capability, &'static str) {
    match op {
        BinaryOp::Add => (Capability::Add, "+"),
        BinaryOp::Sub => (Capability::Num, "-"),
        BinaryOp::Mul => (Capability::Num, "*"),
        BinaryOp::Div => (Capability::Num, "/"),
        BinaryOp::Rem => (Capability::Num, "%"),
        BinaryOp::Eq => (Capability::Eq, "=="),
        BinaryOp::Ne => (Capability::Eq, "!="),
        BinaryOp::Lt => (Capability::Ord, "<"),
        BinaryOp::Le => (Capability::Ord, "<="),
        BinaryOp::Gt => (Capability::Ord, ">"),
        BinaryOp::Ge => (Capability::Ord, ">="),
        BinaryOp::And => (Capability::Eq, "&&"),
        BinaryOp::Or => (Capability::Eq, "||"),
    }
}
