//! Statement definitions for the AST

use super::*;

/// Statement
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stmt {
    /// let [mut] name[: Type] = init
    Let {
        name: Node<Ident>,
        mutable: bool,
        ty: Option<Node<TypeExpr>>,
        init: Node<Expr>,
    },

    /// target = value, where target is a variable or a field path
    Assign {
        target: Node<Expr>,
        value: Node<Expr>,
    },

    /// Expression statement
    Expr(Node<Expr>),

    /// print(expr)
    Print(Node<Expr>),

    Return(Option<Node<Expr>>),

    /// If statement. `if x != null { .. }` doubles as the narrowing guard.
    If {
        cond: Node<Expr>,
        then_block: Node<Block>,
        else_block: Option<Node<Block>>,
    },

    While {
        cond: Node<Expr>,
        body: Node<Block>,
    },

    Break,

    Continue,

    /// Nested block: { stmts }
    Block(Node<Block>),
}

/// Block of statements forming one lexical scope
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block {
    pub stmts: Vec<Node<Stmt>>,
}
