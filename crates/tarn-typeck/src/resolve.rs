//! Name and type-annotation resolution against the symbol table

use std::collections::HashSet;

use tarn_ast::{Ident, Node, TypeExpr};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::symbols::SymbolTable;
use crate::types::{FunctionSig, ModuleId, PrimitiveKind, QualifiedName, StructDef, StructLookup, Type, TypeParamDef};

/// Why a checking task stopped
#[derive(Debug)]
pub(crate) enum Abort {
    Failed(Diagnostic),
    /// Touched an item whose declaration already failed; its diagnostic
    /// was reported there
    Poisoned,
}

impl From<Diagnostic> for Abort {
    fn from(diagnostic: Diagnostic) -> Self {
        Abort::Failed(diagnostic)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Resolver<'a> {
    pub module: &'a ModuleId,
    pub symbols: &'a SymbolTable,
    pub poisoned: &'a HashSet<QualifiedName>,
}

impl<'a> Resolver<'a> {
    /// `name` → this module, `module::name` → this package, `pkg::module::name` as is
    pub fn qualify(&self, ident: &Ident) -> Option<QualifiedName> {
        match ident.segments().as_slice() {
            [name] => Some(self.module.qualify(*name)),
            [module, name] => Some(ModuleId::new(self.module.package.clone(), *module).qualify(*name)),
            [package, module, name] => Some(ModuleId::new(*package, *module).qualify(*name)),
            _ => None,
        }
    }

    fn check_poisoned(&self, name: &QualifiedName) -> Result<(), Abort> {
        if self.poisoned.contains(name) {
            Err(Abort::Poisoned)
        } else {
            Ok(())
        }
    }

    pub fn resolve_struct(&self, ident: &Node<Ident>) -> Result<&'a StructDef, Abort> {
        let name = self.qualify(&ident.value);
        if let Some(name) = &name {
            self.check_poisoned(name)?;
            if let Some(def) = self.symbols.struct_def(name) {
                return Ok(def);
            }
        }
        Err(Diagnostic::new(
            DiagnosticKind::UnresolvedType,
            ident.span,
            format!("cannot find struct `{}`", ident.value),
        )
        .into())
    }

    pub fn resolve_function(&self, ident: &Node<Ident>) -> Result<&'a FunctionSig, Abort> {
        let name = self.qualify(&ident.value);
        if let Some(name) = &name {
            self.check_poisoned(name)?;
            if let Some(sig) = self.symbols.function(name) {
                return Ok(sig);
            }
        }
        Err(Diagnostic::new(
            DiagnosticKind::UnresolvedVariable,
            ident.span,
            format!("cannot find function `{}`", ident.value),
        )
        .into())
    }

    pub fn is_function(&self, ident: &Ident) -> bool {
        self.qualify(ident).map_or(false, |name| self.symbols.function(&name).is_some())
    }

    /// Resolve an annotation; `generics` are the type parameters in scope
    pub fn resolve_type(&self, ty: &Node<TypeExpr>, generics: &[TypeParamDef]) -> Result<Type, Abort> {
        match &ty.value {
            TypeExpr::Named(ident) => {
                if let Some(param) = generics.iter().find(|p| p.name == ident.name) {
                    return Ok(param.as_type());
                }
                if let Some(kind) = PrimitiveKind::from_name(&ident.name) {
                    return Ok(Type::Primitive(kind));
                }
                let def = self.resolve_struct(&Node::new(ident.clone(), ty.span))?;
                Ok(Type::Struct(def.name.clone()))
            }
            TypeExpr::Nullable(inner) => Ok(Type::nullable(self.resolve_type(inner, generics)?)),
            TypeExpr::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type(p, generics))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = self.resolve_type(ret, generics)?;
                Ok(Type::Function { params, ret: Box::new(ret) })
            }
        }
    }
}
