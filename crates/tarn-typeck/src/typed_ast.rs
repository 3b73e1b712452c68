//! Typed AST produced by a successful check.
//!
//! Every expression carries its resolved [`Type`]; locals are resolved to
//! per-function [`BindingId`]s; the ownership pass annotates each local use
//! and records the drops needed where control-flow paths disagree about
//! which bindings are still owned.

use tarn_ast::{
    self as ast, BinaryOp, Block, Expr, FieldDecl, FieldInit, FunctionDecl, Ident, Item, Literal, Node,
    OwnershipKind, Param, Span, Stmt, StructDecl, TypeExpr, TypeParam, UnaryOp,
};

use crate::types::{FunctionSig, ModuleId, QualifiedName, StructDef, Type};

/// Index into [`TypedFunction::bindings`]
pub type BindingId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct TypedModule {
    pub id: ModuleId,
    pub structs: Vec<StructDef>,
    pub functions: Vec<TypedFunction>,
}

/// A local variable or parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub ownership: OwnershipKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub sig: FunctionSig,
    /// Parameter bindings in declaration order
    pub params: Vec<BindingId>,
    pub bindings: Vec<Binding>,
    pub body: TypedBlock,
}

impl TypedFunction {
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id as usize]
    }

    pub fn is_generic(&self) -> bool {
        !self.sig.type_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedBlock {
    pub stmts: Vec<TypedStmt>,
    pub span: Span,
}

impl TypedBlock {
    /// True when control can never reach the end of the block
    pub fn diverges(&self) -> bool {
        self.stmts.iter().any(TypedStmt::diverges)
    }

    /// Does this block contain a `break` targeting the enclosing loop?
    pub fn contains_break(&self) -> bool {
        self.stmts.iter().any(|stmt| match &stmt.kind {
            TypedStmtKind::Break { .. } => true,
            TypedStmtKind::If { then_block, else_block, .. } => {
                then_block.contains_break() || else_block.as_ref().map_or(false, TypedBlock::contains_break)
            }
            TypedStmtKind::Block(block) => block.contains_break(),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedStmt {
    pub kind: TypedStmtKind,
    pub span: Span,
}

impl TypedStmt {
    pub fn diverges(&self) -> bool {
        match &self.kind {
            TypedStmtKind::Return(_) | TypedStmtKind::Break { .. } | TypedStmtKind::Continue => true,
            TypedStmtKind::If { then_block, else_block: Some(else_block), .. } => {
                then_block.diverges() && else_block.diverges()
            }
            TypedStmtKind::While { cond, body, .. } => cond.is_true_literal() && !body.contains_break(),
            TypedStmtKind::Block(block) => block.diverges(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStmtKind {
    Let {
        binding: BindingId,
        init: TypedExpr,
    },
    Assign {
        binding: BindingId,
        value: TypedExpr,
    },
    FieldAssign {
        /// Place expression holding the struct
        object: TypedExpr,
        struct_name: QualifiedName,
        index: usize,
        field: String,
        value: TypedExpr,
    },
    Expr(TypedExpr),
    Print(TypedExpr),
    Return(Option<TypedExpr>),
    If {
        cond: TypedExpr,
        then_block: TypedBlock,
        else_block: Option<TypedBlock>,
        /// Owned bindings the then-path must release before the merge
        then_drops: Vec<BindingId>,
        /// Same for the else-path (also applies when there is no else block)
        else_drops: Vec<BindingId>,
    },
    While {
        cond: TypedExpr,
        body: TypedBlock,
        /// Released when the condition turns false
        exit_drops: Vec<BindingId>,
    },
    Break {
        drops: Vec<BindingId>,
    },
    Continue,
    Block(TypedBlock),
}

/// How a local is used at one site; filled in by the ownership pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Copy type, duplicated
    Copy,
    /// Owned value transferred out of the binding
    Move,
    /// Non-consuming access (field read, comparison, print)
    Read,
    /// Lent to a `let` borrow or a borrowed parameter
    Borrow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: Type,
    pub span: Span,
}

impl TypedExpr {
    pub fn is_true_literal(&self) -> bool {
        matches!(self.kind, TypedExprKind::Literal(Literal::Bool(true)))
    }

    /// The binding at the root of a place expression (`x`, `x.a.b`)
    pub fn place_root(&self) -> Option<BindingId> {
        match &self.kind {
            TypedExprKind::Local { binding, .. } => Some(*binding),
            TypedExprKind::Field { object, .. } => object.place_root(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedArg {
    pub expr: TypedExpr,
    /// Ownership kind of the receiving parameter
    pub ownership: OwnershipKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Literal(Literal),
    Local {
        binding: BindingId,
        usage: Usage,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    /// Includes the short-circuiting `&&` and `||`
    Binary {
        op: BinaryOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
        /// Owned bindings the right operand moves; released when a
        /// short circuit skips it
        skip_drops: Vec<BindingId>,
    },
    Call {
        function: QualifiedName,
        /// Resolved type arguments, one per type parameter
        type_args: Vec<Type>,
        args: Vec<TypedArg>,
    },
    /// Fields in declaration order
    StructLit {
        name: QualifiedName,
        fields: Vec<(String, TypedExpr)>,
    },
    Field {
        object: Box<TypedExpr>,
        struct_name: QualifiedName,
        index: usize,
        name: String,
    },
    Borrow {
        mutable: bool,
        place: Box<TypedExpr>,
    },
    Clone(Box<TypedExpr>),
}

// =============================================================================
// Erasure back to the untyped tree
// =============================================================================

/// Turn a checked module back into an untyped one, writing every resolved
/// type into the tree as an explicit annotation: `let` bindings get their
/// types and generic calls their type arguments. Checking the result again
/// yields the same typed module.
pub fn erase_with_hints(module: &TypedModule) -> ast::Module {
    let mut items = Vec::new();
    for def in &module.structs {
        items.push(Node::new(Item::Struct(erase_struct(def)), def.span));
    }
    for func in &module.functions {
        items.push(Node::new(Item::Function(erase_function(func)), func.sig.span));
    }
    ast::Module {
        package: module.id.package.clone(),
        name: module.id.module.clone(),
        items,
        span: Span::default(),
    }
}

/// Render a resolved type as a type annotation
pub fn type_to_expr(ty: &Type, span: Span) -> Node<TypeExpr> {
    let expr = match ty {
        Type::Primitive(kind) => TypeExpr::Named(Ident::new(kind.name())),
        Type::Nullable(inner) => TypeExpr::Nullable(Box::new(type_to_expr(inner, span))),
        Type::Struct(name) => TypeExpr::Named(Ident::new(name.to_string())),
        Type::Function { params, ret } => TypeExpr::Function {
            params: params.iter().map(|p| type_to_expr(p, span)).collect(),
            ret: Box::new(type_to_expr(ret, span)),
        },
        Type::Generic { name, .. } => TypeExpr::Named(Ident::new(name.clone())),
        Type::Var(v) => TypeExpr::Named(Ident::new(format!("?{}", v))),
    };
    Node::new(expr, span)
}

fn erase_struct(def: &StructDef) -> StructDecl {
    StructDecl {
        name: Node::new(Ident::new(def.name.name.clone()), def.span),
        visibility: def.visibility,
        copy: def.copy,
        fields: def
            .fields
            .iter()
            .map(|f| FieldDecl {
                name: Node::new(Ident::new(f.name.clone()), def.span),
                ty: type_to_expr(&f.ty, def.span),
                visibility: f.read,
                write_visibility: Some(f.write),
            })
            .collect(),
    }
}

fn erase_function(func: &TypedFunction) -> FunctionDecl {
    let sig = &func.sig;
    FunctionDecl {
        name: Node::new(Ident::new(sig.name.name.clone()), sig.span),
        visibility: sig.visibility,
        type_params: sig
            .type_params
            .iter()
            .map(|tp| TypeParam {
                name: Node::new(Ident::new(tp.name.clone()), sig.span),
                bounds: tp.bounds.iter().map(|b| Node::new(Ident::new(b.to_string()), sig.span)).collect(),
            })
            .collect(),
        params: func
            .params
            .iter()
            .map(|id| {
                let b = func.binding(*id);
                Param {
                    name: Node::new(Ident::new(b.name.clone()), b.span),
                    ty: type_to_expr(&b.ty, b.span),
                    ownership: b.ownership,
                    mutable: b.mutable,
                }
            })
            .collect(),
        return_type: Some(type_to_expr(&sig.ret, sig.span)),
        body: erase_block(func, &func.body),
    }
}

fn erase_block(func: &TypedFunction, block: &TypedBlock) -> Node<Block> {
    Node::new(
        Block { stmts: block.stmts.iter().map(|s| erase_stmt(func, s)).collect() },
        block.span,
    )
}

fn erase_stmt(func: &TypedFunction, stmt: &TypedStmt) -> Node<Stmt> {
    let kind = match &stmt.kind {
        TypedStmtKind::Let { binding, init } => {
            let b = func.binding(*binding);
            Stmt::Let {
                name: Node::new(Ident::new(b.name.clone()), b.span),
                mutable: b.mutable,
                // `Null` has no spelling; the initializer determines it again
                ty: (b.ty != Type::NULL).then(|| type_to_expr(&b.ty, b.span)),
                init: erase_expr(func, init),
            }
        }
        TypedStmtKind::Assign { binding, value } => {
            let b = func.binding(*binding);
            Stmt::Assign {
                target: Node::new(Expr::Ident(Ident::new(b.name.clone())), stmt.span),
                value: erase_expr(func, value),
            }
        }
        TypedStmtKind::FieldAssign { object, field, value, .. } => Stmt::Assign {
            target: Node::new(
                Expr::Field {
                    object: Box::new(erase_expr(func, object)),
                    field: Node::new(Ident::new(field.clone()), stmt.span),
                },
                stmt.span,
            ),
            value: erase_expr(func, value),
        },
        TypedStmtKind::Expr(e) => Stmt::Expr(erase_expr(func, e)),
        TypedStmtKind::Print(e) => Stmt::Print(erase_expr(func, e)),
        TypedStmtKind::Return(e) => Stmt::Return(e.as_ref().map(|e| erase_expr(func, e))),
        TypedStmtKind::If { cond, then_block, else_block, .. } => Stmt::If {
            cond: erase_expr(func, cond),
            then_block: erase_block(func, then_block),
            else_block: else_block.as_ref().map(|b| erase_block(func, b)),
        },
        TypedStmtKind::While { cond, body, .. } => Stmt::While {
            cond: erase_expr(func, cond),
            body: erase_block(func, body),
        },
        TypedStmtKind::Break { .. } => Stmt::Break,
        TypedStmtKind::Continue => Stmt::Continue,
        TypedStmtKind::Block(block) => Stmt::Block(erase_block(func, block)),
    };
    Node::new(kind, stmt.span)
}

fn erase_expr(func: &TypedFunction, expr: &TypedExpr) -> Node<Expr> {
    let span = expr.span;
    let boxed = |e: &TypedExpr| Box::new(erase_expr(func, e));
    let kind = match &expr.kind {
        TypedExprKind::Literal(lit) => Expr::Literal(lit.clone()),
        TypedExprKind::Local { binding, .. } => Expr::Ident(Ident::new(func.binding(*binding).name.clone())),
        TypedExprKind::Unary { op, operand } => Expr::Unary { op: *op, operand: boxed(operand) },
        TypedExprKind::Binary { op, left, right, .. } => Expr::Binary { op: *op, left: boxed(left), right: boxed(right) },
        TypedExprKind::Call { function, type_args, args } => Expr::Call {
            callee: Node::new(Ident::new(function.to_string()), span),
            type_args: type_args.iter().map(|t| type_to_expr(t, span)).collect(),
            args: args.iter().map(|a| erase_expr(func, &a.expr)).collect(),
        },
        TypedExprKind::StructLit { name, fields } => Expr::StructLit {
            name: Node::new(Ident::new(name.to_string()), span),
            fields: fields
                .iter()
                .map(|(field, value)| FieldInit {
                    name: Node::new(Ident::new(field.clone()), value.span),
                    value: erase_expr(func, value),
                })
                .collect(),
        },
        TypedExprKind::Field { object, name, .. } => Expr::Field {
            object: boxed(object),
            field: Node::new(Ident::new(name.clone()), span),
        },
        TypedExprKind::Borrow { mutable, place } => Expr::Borrow { mutable: *mutable, place: boxed(place) },
        TypedExprKind::Clone(inner) => Expr::Clone(boxed(inner)),
    };
    Node::new(kind, span)
}
