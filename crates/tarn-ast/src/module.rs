//! Source module

use super::*;

/// One source module of a package
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Module {
    /// Compilation unit the module belongs to
    pub package: String,
    pub name: String,
    pub items: Vec<Node<Item>>,
    pub span: Span,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match &item.value {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.items.iter().filter_map(|item| match &item.value {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }
}
