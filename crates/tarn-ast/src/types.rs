//! Type annotations as written in source

use super::*;

/// Type expression
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeExpr {
    /// Primitive (`Int`, `Float`, `Bool`, `Str`, `Unit`), struct, or type parameter name
    Named(Ident),

    /// T?
    Nullable(Box<Node<TypeExpr>>),

    /// fn(A, B) -> R
    Function {
        params: Vec<Node<TypeExpr>>,
        ret: Box<Node<TypeExpr>>,
    },
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(id) => write!(f, "{}", id),
            TypeExpr::Nullable(inner) => write!(f, "{}?", inner.value),
            TypeExpr::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.value)?;
                }
                write!(f, ") -> {}", ret.value)
            }
        }
    }
}
