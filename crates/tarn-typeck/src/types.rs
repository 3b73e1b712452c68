//! Type representation for the Tarn checker

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tarn_ast::{OwnershipKind, Span, Visibility};

/// Identifies a type variable in a substitution
pub type TypeVarId = u32;

/// Package-qualified module identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub package: String,
    pub module: String,
}

impl ModuleId {
    pub fn new(package: impl Into<String>, module: impl Into<String>) -> Self {
        Self { package: package.into(), module: module.into() }
    }

    pub fn qualify(&self, name: impl Into<String>) -> QualifiedName {
        QualifiedName { package: self.package.clone(), module: self.module.clone(), name: name.into() }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package, self.module)
    }
}

/// Fully qualified item name: package::module::name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub package: String,
    pub module: String,
    pub name: String,
}

impl QualifiedName {
    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(self.package.clone(), self.module.clone())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    /// Type of the `null` literal
    Null,
}

impl PrimitiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Int" => Some(PrimitiveKind::Int),
            "Float" => Some(PrimitiveKind::Float),
            "Bool" => Some(PrimitiveKind::Bool),
            "Str" => Some(PrimitiveKind::Str),
            "Unit" => Some(PrimitiveKind::Unit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "Int",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Bool => "Bool",
            PrimitiveKind::Str => "Str",
            PrimitiveKind::Unit => "Unit",
            PrimitiveKind::Null => "Null",
        }
    }
}

/// Capability a type parameter may be bounded by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Implicitly duplicated on use
    Copy,
    /// == and !=
    Eq,
    /// < <= > >=
    Ord,
    /// Arithmetic
    Num,
    /// + (numeric addition or concatenation)
    Add,
}

impl Capability {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Copy" => Some(Capability::Copy),
            "Eq" => Some(Capability::Eq),
            "Ord" => Some(Capability::Ord),
            "Num" => Some(Capability::Num),
            "Add" => Some(Capability::Add),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Copy => "Copy",
            Capability::Eq => "Eq",
            Capability::Ord => "Ord",
            Capability::Num => "Num",
            Capability::Add => "Add",
        };
        write!(f, "{}", s)
    }
}

/// Semantic type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    Nullable(Box<Type>),
    /// Nominal struct; fields live in the struct's [`StructDef`]
    Struct(QualifiedName),
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Inference variable; never survives a successful check
    Var(TypeVarId),
    /// Rigid type parameter inside a generic body
    Generic { name: String, bounds: Vec<Capability> },
}

impl Type {
    pub const INT: Type = Type::Primitive(PrimitiveKind::Int);
    pub const FLOAT: Type = Type::Primitive(PrimitiveKind::Float);
    pub const BOOL: Type = Type::Primitive(PrimitiveKind::Bool);
    pub const STR: Type = Type::Primitive(PrimitiveKind::Str);
    pub const UNIT: Type = Type::Primitive(PrimitiveKind::Unit);
    pub const NULL: Type = Type::Primitive(PrimitiveKind::Null);

    /// `T?`, collapsing `T??` to `T?`
    pub fn nullable(inner: Type) -> Type {
        match inner {
            Type::Nullable(_) => inner,
            Type::Primitive(PrimitiveKind::Null) => inner,
            other => Type::Nullable(Box::new(other)),
        }
    }

    pub fn is_primitive(&self, kind: PrimitiveKind) -> bool {
        matches!(self, Type::Primitive(k) if *k == kind)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// Does type variable `var` occur in this type?
    pub fn occurs(&self, var: TypeVarId) -> bool {
        match self {
            Type::Var(v) => *v == var,
            Type::Nullable(inner) => inner.occurs(var),
            Type::Function { params, ret } => params.iter().any(|p| p.occurs(var)) || ret.occurs(var),
            _ => false,
        }
    }

    pub fn has_vars(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Nullable(inner) => inner.has_vars(),
            Type::Function { params, ret } => params.iter().any(Type::has_vars) || ret.has_vars(),
            _ => false,
        }
    }

    pub fn has_generics(&self) -> bool {
        match self {
            Type::Generic { .. } => true,
            Type::Nullable(inner) => inner.has_generics(),
            Type::Function { params, ret } => params.iter().any(Type::has_generics) || ret.has_generics(),
            _ => false,
        }
    }

    /// Replace type parameters by name
    pub fn substitute(&self, map: &HashMap<String, Type>) -> Type {
        match self {
            Type::Generic { name, .. } => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Nullable(inner) => Type::nullable(inner.substitute(map)),
            Type::Function { params, ret } => Type::Function {
                params: params.iter().map(|p| p.substitute(map)).collect(),
                ret: Box::new(ret.substitute(map)),
            },
            _ => self.clone(),
        }
    }

    /// Copy types never change ownership state when used
    pub fn is_copy(&self, structs: &impl StructLookup) -> bool {
        self.satisfies(Capability::Copy, structs)
    }

    /// Whether a fully known type provides `cap`. Variables never do.
    pub fn satisfies(&self, cap: Capability, structs: &impl StructLookup) -> bool {
        use Capability::*;
        match self {
            Type::Primitive(kind) => match kind {
                PrimitiveKind::Int | PrimitiveKind::Float => true,
                PrimitiveKind::Str => matches!(cap, Copy | Eq | Add),
                PrimitiveKind::Bool => matches!(cap, Copy | Eq),
                PrimitiveKind::Unit | PrimitiveKind::Null => cap == Copy,
            },
            Type::Nullable(inner) => cap == Copy && inner.satisfies(Copy, structs),
            Type::Struct(name) => {
                cap == Copy && structs.struct_def(name).map(|def| def.copy).unwrap_or(false)
            }
            Type::Generic { bounds, .. } => {
                bounds.contains(&cap) || (cap == Add && bounds.contains(&Num))
            }
            Type::Function { .. } | Type::Var(_) => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(kind) => write!(f, "{}", kind.name()),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Struct(name) => write!(f, "{}", name.name),
            Type::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Var(v) => write!(f, "?{}", v),
            Type::Generic { name, .. } => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub read: Visibility,
    pub write: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: QualifiedName,
    pub visibility: Visibility,
    pub copy: bool,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParamDef {
    pub name: String,
    pub bounds: Vec<Capability>,
}

impl TypeParamDef {
    pub fn as_type(&self) -> Type {
        Type::Generic { name: self.name.clone(), bounds: self.bounds.clone() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub ownership: OwnershipKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub name: QualifiedName,
    pub visibility: Visibility,
    pub type_params: Vec<TypeParamDef>,
    pub params: Vec<ParamSig>,
    pub ret: Type,
    pub span: Span,
}

impl FunctionSig {
    pub fn as_type(&self) -> Type {
        Type::Function {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

/// Access to struct definitions by name
pub trait StructLookup {
    fn struct_def(&self, name: &QualifiedName) -> Option<&StructDef>;
}

impl StructLookup for BTreeMap<QualifiedName, StructDef> {
    fn struct_def(&self, name: &QualifiedName) -> Option<&StructDef> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(copy: bool) -> BTreeMap<QualifiedName, StructDef> {
        let name = ModuleId::new("app", "geo").qualify("Point");
        let mut map = BTreeMap::new();
        map.insert(
            name.clone(),
            StructDef { name, visibility: Visibility::Public, copy, fields: vec![], span: Span::default() },
        );
        map
    }

    #[test]
    fn test_nullable_collapses() {
        let t = Type::nullable(Type::nullable(Type::INT));
        assert_eq!(t, Type::Nullable(Box::new(Type::INT)));
        assert_eq!(t.to_string(), "Int?");
    }

    #[test]
    fn test_copy_types() {
        let structs = point(false);
        let p = Type::Struct(ModuleId::new("app", "geo").qualify("Point"));
        assert!(Type::INT.is_copy(&structs));
        assert!(Type::nullable(Type::STR).is_copy(&structs));
        assert!(!p.is_copy(&structs));
        assert!(!Type::nullable(p.clone()).is_copy(&structs));
        assert!(p.is_copy(&point(true)));
    }

    #[test]
    fn test_generic_capabilities() {
        let structs = point(false);
        let t = Type::Generic { name: "T".into(), bounds: vec![Capability::Num] };
        assert!(t.satisfies(Capability::Add, &structs));
        assert!(!t.satisfies(Capability::Copy, &structs));
        assert!(!Type::BOOL.satisfies(Capability::Ord, &structs));
    }

    #[test]
    fn test_occurs_and_substitute() {
        let f = Type::Function { params: vec![Type::Var(3)], ret: Box::new(Type::INT) };
        assert!(f.occurs(3));
        assert!(!f.occurs(4));

        let mut map = HashMap::new();
        map.insert("T".to_string(), Type::FLOAT);
        let g = Type::nullable(Type::Generic { name: "T".into(), bounds: vec![] });
        assert_eq!(g.substitute(&map), Type::nullable(Type::FLOAT));
    }
}
