//! Top-level declarations

use super::*;

/// Top-level item
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Item {
    Function(FunctionDecl),
    Struct(StructDecl),
}

impl Item {
    pub fn name(&self) -> &Node<Ident> {
        match self {
            Item::Function(f) => &f.name,
            Item::Struct(s) => &s.name,
        }
    }
}

/// Function declaration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionDecl {
    pub name: Node<Ident>,
    pub visibility: Visibility,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    /// `None` means `Unit`
    pub return_type: Option<Node<TypeExpr>>,
    pub body: Node<Block>,
}

/// Generic parameter with capability bounds: T: Copy + Eq
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeParam {
    pub name: Node<Ident>,
    pub bounds: Vec<Node<Ident>>,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Param {
    pub name: Node<Ident>,
    pub ty: Node<TypeExpr>,
    pub ownership: OwnershipKind,
    pub mutable: bool,
}

/// Struct declaration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructDecl {
    pub name: Node<Ident>,
    pub visibility: Visibility,
    /// Inline value type, copied on assignment
    pub copy: bool,
    pub fields: Vec<FieldDecl>,
}

/// Struct field with independent read/write visibility
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDecl {
    pub name: Node<Ident>,
    pub ty: Node<TypeExpr>,
    pub visibility: Visibility,
    /// Falls back to `visibility` when absent
    pub write_visibility: Option<Visibility>,
}

impl FieldDecl {
    pub fn write_visibility(&self) -> Visibility {
        self.write_visibility.unwrap_or(self.visibility)
    }
}
