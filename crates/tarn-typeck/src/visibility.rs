//! Visibility checking of calls, struct construction and field access

use tarn_ast::{Span, Visibility};

use crate::error::{AccessKind, Diagnostic, DiagnosticKind};
use crate::symbols::SymbolTable;
use crate::typed_ast::{TypedBlock, TypedExpr, TypedExprKind, TypedFunction, TypedStmtKind};
use crate::types::{ModuleId, QualifiedName, StructLookup, Type};

/// Can code in `from` see an item declared in `owner` with `visibility`?
pub fn is_visible(visibility: Visibility, owner: &ModuleId, from: &ModuleId) -> bool {
    match visibility {
        Visibility::Private => owner == from,
        Visibility::Module => owner.package == from.package,
        Visibility::Public => true,
    }
}

pub(crate) fn check(func: &TypedFunction, symbols: &SymbolTable, from: &ModuleId) -> Vec<Diagnostic> {
    let mut pass = VisibilityPass { symbols, from, diagnostics: Vec::new() };
    for ty in func.sig.params.iter().map(|p| &p.ty).chain(std::iter::once(&func.sig.ret)) {
        pass.type_use(ty, func.sig.span);
    }
    pass.block(&func.body);
    pass.diagnostics
}

struct VisibilityPass<'a> {
    symbols: &'a SymbolTable,
    from: &'a ModuleId,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> VisibilityPass<'a> {
    fn deny(&mut self, access: AccessKind, span: Span, message: String) {
        self.diagnostics.push(Diagnostic::new(DiagnosticKind::VisibilityViolation(access), span, message));
    }

    fn type_use(&mut self, ty: &Type, span: Span) {
        match ty {
            Type::Struct(name) => self.struct_use(name, span),
            Type::Nullable(inner) => self.type_use(inner, span),
            Type::Function { params, ret } => {
                for param in params {
                    self.type_use(param, span);
                }
                self.type_use(ret, span);
            }
            _ => {}
        }
    }

    fn struct_use(&mut self, name: &QualifiedName, span: Span) {
        let Some(def) = self.symbols.struct_def(name) else {
            return;
        };
        if !is_visible(def.visibility, &name.module_id(), self.from) {
            self.deny(
                AccessKind::ReadDenied,
                span,
                format!("struct `{}` is not visible outside {}", name, scope_of(def.visibility, name)),
            );
        }
    }

    fn field(&mut self, struct_name: &QualifiedName, index: usize, access: AccessKind, span: Span) {
        let Some(field) = self.symbols.struct_def(struct_name).and_then(|def| def.fields.get(index)) else {
            return;
        };
        let visibility = match access {
            AccessKind::ReadDenied => field.read,
            AccessKind::WriteDenied => field.write,
        };
        if !is_visible(visibility, &struct_name.module_id(), self.from) {
            let verb = match access {
                AccessKind::ReadDenied => "read",
                AccessKind::WriteDenied => "written",
            };
            self.deny(
                access,
                span,
                format!(
                    "field `{}` of `{}` cannot be {} outside {}",
                    field.name,
                    struct_name.name,
                    verb,
                    scope_of(visibility, struct_name)
                ),
            );
        }
    }

    fn block(&mut self, block: &TypedBlock) {
        for stmt in &block.stmts {
            match &stmt.kind {
                TypedStmtKind::Let { init: e, .. }
                | TypedStmtKind::Assign { value: e, .. }
                | TypedStmtKind::Expr(e)
                | TypedStmtKind::Print(e)
                | TypedStmtKind::Return(Some(e)) => self.expr(e),
                TypedStmtKind::FieldAssign { object, struct_name, index, value, .. } => {
                    self.expr(object);
                    self.field(struct_name, *index, AccessKind::WriteDenied, stmt.span);
                    self.expr(value);
                }
                TypedStmtKind::If { cond, then_block, else_block, .. } => {
                    self.expr(cond);
                    self.block(then_block);
                    if let Some(block) = else_block {
                        self.block(block);
                    }
                }
                TypedStmtKind::While { cond, body, .. } => {
                    self.expr(cond);
                    self.block(body);
                }
                TypedStmtKind::Block(inner) => self.block(inner),
                TypedStmtKind::Return(None) | TypedStmtKind::Break { .. } | TypedStmtKind::Continue => {}
            }
        }
    }

    fn expr(&mut self, expr: &TypedExpr) {
        match &expr.kind {
            TypedExprKind::Literal(_) | TypedExprKind::Local { .. } => {}
            TypedExprKind::Unary { operand, .. } => self.expr(operand),
            TypedExprKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            TypedExprKind::Call { function, args, .. } => {
                if let Some(sig) = self.symbols.function(function) {
                    if !is_visible(sig.visibility, &function.module_id(), self.from) {
                        self.deny(
                            AccessKind::ReadDenied,
                            expr.span,
                            format!("function `{}` is not visible outside {}", function, scope_of(sig.visibility, function)),
                        );
                    }
                }
                for arg in args {
                    self.expr(&arg.expr);
                }
            }
            TypedExprKind::StructLit { name, fields } => {
                self.struct_use(name, expr.span);
                for (index, (_, value)) in fields.iter().enumerate() {
                    self.field(name, index, AccessKind::WriteDenied, value.span);
                    self.expr(value);
                }
            }
            TypedExprKind::Field { object, struct_name, index, .. } => {
                self.expr(object);
                self.field(struct_name, *index, AccessKind::ReadDenied, expr.span);
            }
            TypedExprKind::Borrow { place: inner, .. } | TypedExprKind::Clone(inner) => self.expr(inner),
        }
    }
}

fn scope_of(visibility: Visibility, owner: &QualifiedName) -> String {
    match visibility {
        Visibility::Private => format!("module `{}`", owner.module_id()),
        Visibility::Module => format!("package `{}`", owner.package),
        Visibility::Public => "anywhere".to_string(),
    }
}
