//! Struct layouts as seen by the VM

use std::collections::BTreeMap;

use tarn_bytecode::{FieldDesc, Storage, TypeDescriptor};
use tarn_typeck::{QualifiedName, StructDef, StructLookup, Type, TypedModule};

/// Every struct of the compiled modules, keyed by qualified name
#[derive(Debug, Default)]
pub(crate) struct Layouts<'a> {
    structs: BTreeMap<QualifiedName, &'a StructDef>,
}

impl<'a> Layouts<'a> {
    pub(crate) fn new(modules: &'a [TypedModule]) -> Self {
        let structs = modules
            .iter()
            .flat_map(|m| m.structs.iter())
            .map(|def| (def.name.clone(), def))
            .collect();
        Self { structs }
    }

    /// A value of this type must be released when its owner goes away
    pub(crate) fn is_owned(&self, ty: &Type) -> bool {
        !ty.is_copy(self)
    }

    pub(crate) fn descriptor(&self, name: &QualifiedName) -> Option<TypeDescriptor> {
        let def = self.structs.get(name)?;
        Some(TypeDescriptor {
            name: name.to_string(),
            storage: if def.copy { Storage::Inline } else { Storage::Heap },
            fields: def
                .fields
                .iter()
                .map(|f| FieldDesc { name: f.name.clone(), owned: self.is_owned(&f.ty) })
                .collect(),
        })
    }
}

impl StructLookup for Layouts<'_> {
    fn struct_def(&self, name: &QualifiedName) -> Option<&StructDef> {
        self.structs.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_ast::{Span, Visibility};
    use tarn_typeck::{FieldDef, ModuleId};

    fn field(name: &str, ty: Type) -> FieldDef {
        FieldDef { name: name.into(), ty, read: Visibility::Public, write: Visibility::Public }
    }

    #[test]
    fn test_descriptor_marks_owned_fields() {
        let id = ModuleId::new("app", "list");
        let node = id.qualify("Node");
        let module = TypedModule {
            id: id.clone(),
            structs: vec![StructDef {
                name: node.clone(),
                visibility: Visibility::Public,
                copy: false,
                fields: vec![
                    field("value", Type::INT),
                    field("label", Type::STR),
                    field("next", Type::nullable(Type::Struct(node.clone()))),
                ],
                span: Span::default(),
            }],
            functions: vec![],
        };
        let modules = [module];
        let layouts = Layouts::new(&modules);
        let desc = layouts.descriptor(&node).unwrap();
        assert_eq!(desc.name, "app::list::Node");
        assert_eq!(desc.storage, Storage::Heap);
        let owned: Vec<bool> = desc.fields.iter().map(|f| f.owned).collect();
        assert_eq!(owned, vec![false, false, true]);
        assert!(layouts.is_owned(&Type::Struct(node)));
    }
}
