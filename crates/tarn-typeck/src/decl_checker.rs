//! Declaration collection: struct layouts and function signatures

use std::collections::{HashMap, HashSet};

use tarn_ast::{FieldDecl, FunctionDecl, Item, Span, StructDecl};

use crate::checker::Checker;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::resolve::{Abort, Resolver};
use crate::types::{Capability, FieldDef, FunctionSig, ParamSig, QualifiedName, StructDef, StructLookup, Type, TypeParamDef};

impl<'a> Checker<'a> {
    /// Register every struct and function of the module. Items whose
    /// declaration fails are poisoned so their uses stay quiet.
    pub(crate) fn collect(&mut self) {
        let module = self.module;
        let mut first_seen: HashMap<String, Span> = HashMap::new();
        let mut structs: Vec<(&StructDecl, Span)> = Vec::new();
        let mut functions: Vec<(&FunctionDecl, Span)> = Vec::new();

        for item in &module.items {
            let name = item.value.name();
            if let Some(first) = first_seen.get(&name.value.name) {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateDefinition,
                        name.span,
                        format!("`{}` is defined more than once in module `{}`", name.value, self.id),
                    )
                    .with_note(*first, "first defined here"),
                );
                continue;
            }
            first_seen.insert(name.value.name.clone(), name.span);
            match &item.value {
                Item::Struct(decl) => {
                    let qualified = self.id.qualify(decl.name.value.name.clone());
                    // Layout filled in below; the name must resolve first.
                    self.symbols.insert_struct(StructDef {
                        name: qualified.clone(),
                        visibility: decl.visibility,
                        copy: decl.copy,
                        fields: Vec::new(),
                        span: item.span,
                    });
                    self.own_structs.push(qualified);
                    structs.push((decl, item.span));
                }
                Item::Function(decl) => functions.push((decl, item.span)),
            }
        }

        let mut layouts = Vec::new();
        for (decl, span) in structs {
            let name = self.id.qualify(decl.name.value.name.clone());
            match self.struct_layout(decl, span) {
                Ok(def) => layouts.push(def),
                Err(abort) => self.poison(name, abort),
            }
        }
        for def in layouts {
            self.symbols.insert_struct(def);
        }
        self.check_copy_structs();

        for (decl, span) in functions {
            let name = self.id.qualify(decl.name.value.name.clone());
            match self.signature(decl, span) {
                Ok(sig) => self.symbols.insert_function(sig),
                Err(abort) => self.poison(name.clone(), abort),
            }
            self.own_functions.push((name, decl));
        }
    }

    fn poison(&mut self, name: QualifiedName, abort: Abort) {
        if let Abort::Failed(diagnostic) = abort {
            self.diagnostics.push(diagnostic);
        }
        self.poisoned.insert(name);
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver { module: &self.id, symbols: &self.symbols, poisoned: &self.poisoned }
    }

    fn struct_layout(&self, decl: &StructDecl, span: Span) -> Result<StructDef, Abort> {
        let resolver = self.resolver();
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for field in &decl.fields {
            if !seen.insert(field.name.value.name.clone()) {
                return Err(duplicate_field(decl, field).into());
            }
            fields.push(FieldDef {
                name: field.name.value.name.clone(),
                ty: resolver.resolve_type(&field.ty, &[])?,
                read: field.visibility,
                write: field.write_visibility(),
            });
        }
        Ok(StructDef {
            name: self.id.qualify(decl.name.value.name.clone()),
            visibility: decl.visibility,
            copy: decl.copy,
            fields,
            span,
        })
    }

    /// Copy structs are stored inline, so every field must be copy too
    fn check_copy_structs(&mut self) {
        let mut failures = Vec::new();
        for name in &self.own_structs {
            let Some(def) = self.symbols.struct_def(name) else { continue };
            if !def.copy || self.poisoned.contains(name) {
                continue;
            }
            if let Some(field) = def.fields.iter().find(|f| !f.ty.is_copy(&self.symbols)) {
                failures.push((
                    name.clone(),
                    Diagnostic::new(
                        DiagnosticKind::BoundViolation,
                        def.span,
                        format!(
                            "copy struct `{}` cannot hold field `{}` of owned type `{}`",
                            name.name, field.name, field.ty
                        ),
                    ),
                ));
            }
        }
        for (name, diagnostic) in failures {
            self.poison(name, Abort::Failed(diagnostic));
        }
    }

    fn signature(&self, decl: &FunctionDecl, span: Span) -> Result<FunctionSig, Abort> {
        let resolver = self.resolver();

        let mut type_params: Vec<TypeParamDef> = Vec::new();
        for tp in &decl.type_params {
            if type_params.iter().any(|p| p.name == tp.name.value.name) {
                return Err(Diagnostic::new(
                    DiagnosticKind::DuplicateDefinition,
                    tp.name.span,
                    format!("type parameter `{}` is declared twice", tp.name.value),
                )
                .into());
            }
            let mut bounds = Vec::new();
            for bound in &tp.bounds {
                let cap = Capability::from_name(&bound.value.name).ok_or_else(|| {
                    Diagnostic::new(
                        DiagnosticKind::UnresolvedType,
                        bound.span,
                        format!("unknown bound `{}`; expected one of Copy, Eq, Ord, Num, Add", bound.value),
                    )
                })?;
                if !bounds.contains(&cap) {
                    bounds.push(cap);
                }
            }
            type_params.push(TypeParamDef { name: tp.name.value.name.clone(), bounds });
        }

        let mut params: Vec<ParamSig> = Vec::new();
        for param in &decl.params {
            if params.iter().any(|p| p.name == param.name.value.name) {
                return Err(Diagnostic::new(
                    DiagnosticKind::DuplicateDefinition,
                    param.name.span,
                    format!("parameter `{}` is declared twice", param.name.value),
                )
                .into());
            }
            params.push(ParamSig {
                name: param.name.value.name.clone(),
                ty: resolver.resolve_type(&param.ty, &type_params)?,
                ownership: param.ownership,
            });
        }

        let ret = match &decl.return_type {
            Some(ty) => resolver.resolve_type(ty, &type_params)?,
            None => Type::UNIT,
        };

        Ok(FunctionSig {
            name: self.id.qualify(decl.name.value.name.clone()),
            visibility: decl.visibility,
            type_params,
            params,
            ret,
            span,
        })
    }
}

fn duplicate_field(decl: &StructDecl, field: &FieldDecl) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::DuplicateDefinition,
        field.name.span,
        format!("field `{}` is declared twice in `{}`", field.name.value, decl.name.value),
    )
}
