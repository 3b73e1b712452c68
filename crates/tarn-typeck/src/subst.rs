//! Substitution for type variables.
//!
//! Union-find over [`TypeVarId`]s: each slot is either unbound or points at
//! a type, which may itself be another variable.

use crate::types::{Type, TypeVarId};

#[derive(Debug, Clone, Default)]
pub struct Subst {
    parent: Vec<Option<Type>>,
}

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn fresh_var(&mut self) -> TypeVarId {
        let var = self.parent.len() as TypeVarId;
        self.parent.push(None);
        var
    }

    pub fn fresh(&mut self) -> Type {
        Type::Var(self.fresh_var())
    }

    /// Bind an unbound variable. Callers run the occurs check first.
    pub fn bind(&mut self, var: TypeVarId, ty: Type) {
        if let Some(slot) = self.parent.get_mut(var as usize) {
            *slot = Some(ty);
        }
    }

    /// Follow variable links until reaching an unbound variable or a
    /// non-variable type, compressing the path on the way back.
    pub fn resolve(&mut self, ty: &Type) -> Type {
        let mut current = ty.clone();
        let mut path = Vec::new();
        while let Type::Var(v) = current {
            match self.parent.get(v as usize).cloned().flatten() {
                Some(next) => {
                    path.push(v);
                    current = next;
                }
                None => break,
            }
        }
        if path.len() > 1 {
            for v in path {
                self.parent[v as usize] = Some(current.clone());
            }
        }
        current
    }

    /// Apply the substitution everywhere inside `ty`
    pub fn apply(&mut self, ty: &Type) -> Type {
        match self.resolve(ty) {
            Type::Nullable(inner) => Type::nullable(self.apply(&inner)),
            Type::Function { params, ret } => Type::Function {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(&ret)),
            },
            other => other,
        }
    }
}
