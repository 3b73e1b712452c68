//! Helpers for constructing trees in code.
//!
//! Every node gets an empty span; use [`Node::at`] when a test cares
//! about locations.

use super::*;

fn node<T>(value: T) -> Node<T> {
    Node::new(value, Span::default())
}

fn ident(name: &str) -> Node<Ident> {
    node(Ident::new(name))
}

pub fn module(package: &str, name: &str, items: Vec<Node<Item>>) -> Module {
    Module {
        package: package.to_string(),
        name: name.to_string(),
        items,
        span: Span::default(),
    }
}

// -----------------------------------------------------------------------------
// Items
// -----------------------------------------------------------------------------

pub struct FnBuilder {
    decl: FunctionDecl,
}

pub fn func(name: &str) -> FnBuilder {
    FnBuilder {
        decl: FunctionDecl {
            name: ident(name),
            visibility: Visibility::Private,
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: None,
            body: node(Block::default()),
        },
    }
}

impl FnBuilder {
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.decl.visibility = visibility;
        self
    }

    pub fn public(self) -> Self {
        self.visibility(Visibility::Public)
    }

    pub fn type_param(mut self, name: &str, bounds: &[&str]) -> Self {
        self.decl.type_params.push(TypeParam {
            name: ident(name),
            bounds: bounds.iter().map(|b| ident(b)).collect(),
        });
        self
    }

    fn push_param(mut self, name: &str, ty: Node<TypeExpr>, ownership: OwnershipKind, mutable: bool) -> Self {
        self.decl.params.push(Param { name: ident(name), ty, ownership, mutable });
        self
    }

    pub fn param(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.push_param(name, ty, OwnershipKind::Owned, false)
    }

    pub fn param_mut(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.push_param(name, ty, OwnershipKind::Owned, true)
    }

    pub fn param_ref(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.push_param(name, ty, OwnershipKind::Shared, false)
    }

    pub fn param_ref_mut(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.push_param(name, ty, OwnershipKind::Mut, false)
    }

    pub fn returns(mut self, ty: Node<TypeExpr>) -> Self {
        self.decl.return_type = Some(ty);
        self
    }

    pub fn body(mut self, stmts: Vec<Node<Stmt>>) -> Node<Item> {
        self.decl.body = node(Block { stmts });
        node(Item::Function(self.decl))
    }
}

pub struct StructBuilder {
    decl: StructDecl,
}

pub fn structure(name: &str) -> StructBuilder {
    StructBuilder {
        decl: StructDecl {
            name: ident(name),
            visibility: Visibility::Private,
            copy: false,
            fields: Vec::new(),
        },
    }
}

impl StructBuilder {
    pub fn public(mut self) -> Self {
        self.decl.visibility = Visibility::Public;
        self
    }

    pub fn copy(mut self) -> Self {
        self.decl.copy = true;
        self
    }

    pub fn field_with(
        mut self,
        name: &str,
        ty: Node<TypeExpr>,
        visibility: Visibility,
        write_visibility: Option<Visibility>,
    ) -> Self {
        self.decl.fields.push(FieldDecl { name: ident(name), ty, visibility, write_visibility });
        self
    }

    pub fn field(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.field_with(name, ty, Visibility::Private, None)
    }

    pub fn pub_field(self, name: &str, ty: Node<TypeExpr>) -> Self {
        self.field_with(name, ty, Visibility::Public, None)
    }

    pub fn build(self) -> Node<Item> {
        node(Item::Struct(self.decl))
    }
}

// -----------------------------------------------------------------------------
// Types
// -----------------------------------------------------------------------------

pub fn ty(name: &str) -> Node<TypeExpr> {
    node(TypeExpr::Named(Ident::new(name)))
}

pub fn nullable(inner: Node<TypeExpr>) -> Node<TypeExpr> {
    node(TypeExpr::Nullable(Box::new(inner)))
}

pub fn fn_ty(params: Vec<Node<TypeExpr>>, ret: Node<TypeExpr>) -> Node<TypeExpr> {
    node(TypeExpr::Function { params, ret: Box::new(ret) })
}

// -----------------------------------------------------------------------------
// Statements
// -----------------------------------------------------------------------------

fn let_stmt(name: &str, mutable: bool, ty: Option<Node<TypeExpr>>, init: Node<Expr>) -> Node<Stmt> {
    node(Stmt::Let { name: ident(name), mutable, ty, init })
}

pub fn let_(name: &str, init: Node<Expr>) -> Node<Stmt> {
    let_stmt(name, false, None, init)
}

pub fn let_mut(name: &str, init: Node<Expr>) -> Node<Stmt> {
    let_stmt(name, true, None, init)
}

pub fn let_typed(name: &str, ty: Node<TypeExpr>, init: Node<Expr>) -> Node<Stmt> {
    let_stmt(name, false, Some(ty), init)
}

pub fn let_mut_typed(name: &str, ty: Node<TypeExpr>, init: Node<Expr>) -> Node<Stmt> {
    let_stmt(name, true, Some(ty), init)
}

pub fn assign(target: Node<Expr>, value: Node<Expr>) -> Node<Stmt> {
    node(Stmt::Assign { target, value })
}

pub fn expr_stmt(expr: Node<Expr>) -> Node<Stmt> {
    node(Stmt::Expr(expr))
}

pub fn print(expr: Node<Expr>) -> Node<Stmt> {
    node(Stmt::Print(expr))
}

pub fn ret(expr: Node<Expr>) -> Node<Stmt> {
    node(Stmt::Return(Some(expr)))
}

pub fn ret_unit() -> Node<Stmt> {
    node(Stmt::Return(None))
}

pub fn if_(cond: Node<Expr>, then_block: Vec<Node<Stmt>>) -> Node<Stmt> {
    node(Stmt::If { cond, then_block: node(Block { stmts: then_block }), else_block: None })
}

pub fn if_else(cond: Node<Expr>, then_block: Vec<Node<Stmt>>, else_block: Vec<Node<Stmt>>) -> Node<Stmt> {
    node(Stmt::If {
        cond,
        then_block: node(Block { stmts: then_block }),
        else_block: Some(node(Block { stmts: else_block })),
    })
}

pub fn while_(cond: Node<Expr>, body: Vec<Node<Stmt>>) -> Node<Stmt> {
    node(Stmt::While { cond, body: node(Block { stmts: body }) })
}

pub fn brk() -> Node<Stmt> {
    node(Stmt::Break)
}

pub fn cont() -> Node<Stmt> {
    node(Stmt::Continue)
}

pub fn block(stmts: Vec<Node<Stmt>>) -> Node<Stmt> {
    node(Stmt::Block(node(Block { stmts })))
}

// -----------------------------------------------------------------------------
// Expressions
// -----------------------------------------------------------------------------

pub fn int(n: i64) -> Node<Expr> {
    node(Expr::Literal(Literal::Int(n)))
}

pub fn float(n: f64) -> Node<Expr> {
    node(Expr::Literal(Literal::Float(n)))
}

pub fn boolean(b: bool) -> Node<Expr> {
    node(Expr::Literal(Literal::Bool(b)))
}

pub fn string(s: &str) -> Node<Expr> {
    node(Expr::Literal(Literal::Str(s.to_string())))
}

pub fn null() -> Node<Expr> {
    node(Expr::Literal(Literal::Null))
}

pub fn unit() -> Node<Expr> {
    node(Expr::Literal(Literal::Unit))
}

pub fn var(name: &str) -> Node<Expr> {
    node(Expr::Ident(Ident::new(name)))
}

pub fn binary(op: BinaryOp, left: Node<Expr>, right: Node<Expr>) -> Node<Expr> {
    node(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
}

macro_rules! binary_helpers {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(left: Node<Expr>, right: Node<Expr>) -> Node<Expr> {
                binary(BinaryOp::$op, left, right)
            }
        )*
    };
}

binary_helpers! {
    add => Add, sub => Sub, mul => Mul, div => Div, rem => Rem,
    eq => Eq, ne => Ne, lt => Lt, le => Le, gt => Gt, ge => Ge,
    and => And, or => Or,
}

pub fn not(operand: Node<Expr>) -> Node<Expr> {
    node(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) })
}

pub fn neg(operand: Node<Expr>) -> Node<Expr> {
    node(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) })
}

pub fn call(name: &str, args: Vec<Node<Expr>>) -> Node<Expr> {
    call_with(name, Vec::new(), args)
}

pub fn call_with(name: &str, type_args: Vec<Node<TypeExpr>>, args: Vec<Node<Expr>>) -> Node<Expr> {
    node(Expr::Call { callee: ident(name), type_args, args })
}

pub fn struct_lit(name: &str, fields: Vec<(&str, Node<Expr>)>) -> Node<Expr> {
    node(Expr::StructLit {
        name: ident(name),
        fields: fields
            .into_iter()
            .map(|(field, value)| FieldInit { name: ident(field), value })
            .collect(),
    })
}

pub fn field(object: Node<Expr>, name: &str) -> Node<Expr> {
    node(Expr::Field { object: Box::new(object), field: ident(name) })
}

pub fn borrow(place: Node<Expr>) -> Node<Expr> {
    node(Expr::Borrow { mutable: false, place: Box::new(place) })
}

pub fn borrow_mut(place: Node<Expr>) -> Node<Expr> {
    node(Expr::Borrow { mutable: true, place: Box::new(place) })
}

pub fn clone_of(expr: Node<Expr>) -> Node<Expr> {
    node(Expr::Clone(Box::new(expr)))
}
