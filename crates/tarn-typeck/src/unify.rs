//! Constraint solving: unification with occurs check, nullability
//! subtyping, and capability obligations.
//!
//! Constraints are solved as soon as they are emitted. The ones that cannot
//! be decided yet (an unbound variable on the deciding side) wait in a
//! deferred queue that is retried at the end of every statement.

use tarn_ast::Span;

use crate::error::{CheckResult, Diagnostic, DiagnosticKind};
use crate::subst::Subst;
use crate::types::{Capability, PrimitiveKind, StructLookup, Type};

/// Why a capability is required; picks the diagnostic on failure
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityReason {
    Operator(&'static str),
    Bound { param: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equal { expected: Type, found: Type, span: Span },
    /// `sub` must be usable where `sup` is expected
    Subtype { sub: Type, sup: Type, span: Span },
    Capability { ty: Type, cap: Capability, reason: CapabilityReason, span: Span },
}

enum Progress {
    Done,
    Blocked,
}

#[derive(Debug, Default)]
pub struct Solver {
    pub subst: Subst,
    deferred: Vec<Constraint>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Type {
        self.subst.fresh()
    }

    pub fn resolve(&mut self, ty: &Type) -> Type {
        self.subst.resolve(ty)
    }

    pub fn apply(&mut self, ty: &Type) -> Type {
        self.subst.apply(ty)
    }

    /// Solve `constraint` now, or queue it if it cannot be decided yet
    pub fn add(&mut self, constraint: Constraint, structs: &impl StructLookup) -> CheckResult<()> {
        match self.step(&constraint, structs, false)? {
            Progress::Done => Ok(()),
            Progress::Blocked => {
                self.deferred.push(constraint);
                Ok(())
            }
        }
    }

    pub fn equal(&mut self, expected: &Type, found: &Type, span: Span) -> CheckResult<()> {
        self.unify(expected, found, span)
    }

    /// Retry deferred constraints. A blocked subtype obligation binds its
    /// variable to the target (or the target's inner type when the target is
    /// nullable); blocked capabilities stay queued until their type is known.
    pub fn flush(&mut self, structs: &impl StructLookup) -> CheckResult<()> {
        let pending = std::mem::take(&mut self.deferred);
        for constraint in pending {
            if let Progress::Blocked = self.step(&constraint, structs, true)? {
                self.deferred.push(constraint);
            }
        }
        Ok(())
    }

    /// End of a checking task: anything still blocked is ambiguous
    pub fn finish(&mut self, structs: &impl StructLookup) -> CheckResult<()> {
        self.flush(structs)?;
        if let Some(constraint) = self.deferred.first().cloned() {
            let (ty, span) = match constraint {
                Constraint::Capability { ty, span, .. } => (ty, span),
                Constraint::Equal { found, span, .. } => (found, span),
                Constraint::Subtype { sub, span, .. } => (sub, span),
            };
            let ty = self.apply(&ty);
            return Err(Diagnostic::new(
                DiagnosticKind::AmbiguousType,
                span,
                format!("cannot infer a concrete type for `{}`; add a type annotation", ty),
            ));
        }
        Ok(())
    }

    fn step(&mut self, constraint: &Constraint, structs: &impl StructLookup, force: bool) -> CheckResult<Progress> {
        match constraint {
            Constraint::Equal { expected, found, span } => {
                self.unify(expected, found, *span)?;
                Ok(Progress::Done)
            }
            Constraint::Subtype { sub, sup, span } => self.subtype(sub, sup, *span, force),
            Constraint::Capability { ty, cap, reason, span } => self.capability(ty, *cap, reason, *span, structs),
        }
    }

    // =========================================================================
    // Unification
    // =========================================================================

    pub fn unify(&mut self, expected: &Type, found: &Type, span: Span) -> CheckResult<()> {
        let a = self.resolve(expected);
        let b = self.resolve(found);
        match (&a, &b) {
            (Type::Var(x), Type::Var(y)) if x == y => Ok(()),
            (Type::Var(x), other) | (other, Type::Var(x)) => self.bind_var(*x, other, span),
            (Type::Primitive(p), Type::Primitive(q)) if p == q => Ok(()),
            (Type::Nullable(x), Type::Nullable(y)) => self.unify(x, y, span),
            (Type::Struct(x), Type::Struct(y)) if x == y => Ok(()),
            (Type::Generic { name: x, .. }, Type::Generic { name: y, .. }) if x == y => Ok(()),
            (Type::Function { params: p1, ret: r1 }, Type::Function { params: p2, ret: r2 })
                if p1.len() == p2.len() =>
            {
                for (x, y) in p1.iter().zip(p2.iter()) {
                    self.unify(x, y, span)?;
                }
                self.unify(r1, r2, span)
            }
            _ => Err(self.mismatch(&a, &b, span)),
        }
    }

    fn bind_var(&mut self, var: u32, ty: &Type, span: Span) -> CheckResult<()> {
        let ty = self.apply(ty);
        if ty.occurs(var) {
            return Err(Diagnostic::new(
                DiagnosticKind::InfiniteType,
                span,
                format!("type variable ?{} would contain itself in `{}`", var, ty),
            ));
        }
        self.subst.bind(var, ty);
        Ok(())
    }

    fn mismatch(&mut self, expected: &Type, found: &Type, span: Span) -> Diagnostic {
        let expected = self.apply(expected);
        let found = self.apply(found);
        Diagnostic::new(
            DiagnosticKind::TypeMismatch,
            span,
            format!("expected `{}`, found `{}`", expected, found),
        )
    }

    // =========================================================================
    // Nullability lattice: T <= T?, Null <= T?
    // =========================================================================

    fn subtype(&mut self, sub: &Type, sup: &Type, span: Span, force: bool) -> CheckResult<Progress> {
        let sub = self.resolve(sub);
        let sup = self.resolve(sup);
        match (&sub, &sup) {
            (_, Type::Nullable(inner)) => match &sub {
                Type::Primitive(PrimitiveKind::Null) => Ok(Progress::Done),
                Type::Nullable(x) => self.unify(inner, x, span).map(|_| Progress::Done),
                Type::Var(_) if !force => Ok(Progress::Blocked),
                _ => self.unify(inner, &sub, span).map(|_| Progress::Done),
            },
            (Type::Primitive(PrimitiveKind::Null), Type::Var(v)) => {
                let inner = self.fresh();
                self.subst.bind(*v, Type::Nullable(Box::new(inner)));
                Ok(Progress::Done)
            }
            (Type::Var(_), Type::Var(_)) if !force => Ok(Progress::Blocked),
            (_, Type::Var(_)) | (Type::Var(_), _) => self.unify(&sup, &sub, span).map(|_| Progress::Done),
            (Type::Primitive(PrimitiveKind::Null), _) => Err(Diagnostic::new(
                DiagnosticKind::NullabilityViolation,
                span,
                format!("`null` is not allowed where `{}` is required", self.apply(&sup)),
            )),
            (Type::Nullable(_), _) => {
                let sub = self.apply(&sub);
                let sup = self.apply(&sup);
                Err(Diagnostic::new(
                    DiagnosticKind::NullabilityViolation,
                    span,
                    format!("`{}` may be null where `{}` is required; guard it with `!= null` first", sub, sup),
                ))
            }
            _ => self.unify(&sup, &sub, span).map(|_| Progress::Done),
        }
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    fn capability(
        &mut self,
        ty: &Type,
        cap: Capability,
        reason: &CapabilityReason,
        span: Span,
        structs: &impl StructLookup,
    ) -> CheckResult<Progress> {
        let ty = self.apply(ty);
        if let Type::Var(_) = ty {
            return Ok(Progress::Blocked);
        }
        if ty.satisfies(cap, structs) {
            return Ok(Progress::Done);
        }
        let diagnostic = match (reason, &ty) {
            (CapabilityReason::Operator(op), Type::Nullable(_) | Type::Primitive(PrimitiveKind::Null)) => Diagnostic::new(
                DiagnosticKind::NullabilityViolation,
                span,
                format!("operator `{}` applied to `{}`, which may be null", op, ty),
            ),
            (CapabilityReason::Operator(op), _) => Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                span,
                format!("operator `{}` is not defined for `{}`", op, ty),
            ),
            (CapabilityReason::Bound { param }, _) => Diagnostic::new(
                DiagnosticKind::BoundViolation,
                span,
                format!("`{}` does not satisfy bound `{}: {}`", ty, param, cap),
            ),
        };
        Err(diagnostic)
    }
}
