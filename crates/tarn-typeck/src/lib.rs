//! # Tarn Type Checker
//!
//! Type inference with nullability subtyping, bounded generics, affine
//! ownership with borrow checking, and visibility rules. Checking a module
//! produces either a fully typed module or the complete batch of diagnostics.

mod checker;
mod decl_checker;
mod env;
mod error;
mod expr_checker;
mod ownership;
mod resolve;
mod stmt_checker;
mod subst;
mod symbols;
mod typed_ast;
mod types;
mod unify;
mod visibility;

// Re-export public API
pub use checker::Checker;
pub use env::TypeEnv;
pub use error::{AccessKind, CheckResult, Diagnostic, DiagnosticKind};
pub use ownership::OwnershipState;
pub use symbols::SymbolTable;
pub use typed_ast::{
    erase_with_hints, type_to_expr, Binding, BindingId, TypedArg, TypedBlock, TypedExpr, TypedExprKind, TypedFunction,
    TypedModule, TypedStmt, TypedStmtKind, Usage,
};
pub use types::{
    Capability, FieldDef, FunctionSig, ModuleId, ParamSig, PrimitiveKind, QualifiedName, StructDef, StructLookup, Type,
    TypeParamDef, TypeVarId,
};
pub use visibility::is_visible;

use tarn_ast::Module;

// =============================================================================
// Public API
// =============================================================================

/// Check one module against the symbols exported by its dependencies.
///
/// Exactly one of the two outcomes is produced: a typed module, or a
/// non-empty list of diagnostics in deterministic order.
pub fn check_module(module: &Module, deps: &SymbolTable) -> Result<TypedModule, Vec<Diagnostic>> {
    Checker::new(module, deps).run()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tarn_ast::build::*;
    use tarn_ast::{Node, Item, Visibility};

    fn check(items: Vec<Node<Item>>) -> Result<TypedModule, Vec<Diagnostic>> {
        check_module(&module("app", "main", items), &SymbolTable::new())
    }

    fn kinds(result: Result<TypedModule, Vec<Diagnostic>>) -> Vec<DiagnosticKind> {
        match result {
            Ok(_) => Vec::new(),
            Err(diagnostics) => diagnostics.into_iter().map(|d| d.kind).collect(),
        }
    }

    fn consume() -> Node<Item> {
        func("consume").param("s", ty("Box")).body(vec![])
    }

    fn boxed() -> Node<Item> {
        structure("Box").field("v", ty("Int")).build()
    }

    fn find<'a>(module: &'a TypedModule, name: &str) -> &'a TypedFunction {
        module
            .functions
            .iter()
            .find(|f| f.sig.name.name == name)
            .expect("function present")
    }

    // -------------------------------------------------------------------------
    // Inference
    // -------------------------------------------------------------------------

    #[test]
    fn test_simple_let_and_print() {
        let result = check(vec![func("main").body(vec![
            let_("x", add(int(1), int(2))),
            print(var("x")),
        ])]);
        let module = result.expect("checks");
        let main = find(&module, "main");
        assert_eq!(main.bindings[0].ty, Type::INT);
    }

    #[test]
    fn test_type_mismatch() {
        let result = check(vec![func("main").body(vec![let_typed("x", ty("Int"), string("hello"))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::TypeMismatch]);
    }

    #[test]
    fn test_unresolved_variable() {
        let result = check(vec![func("main").body(vec![print(var("nope"))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::UnresolvedVariable]);
    }

    #[test]
    fn test_function_used_as_value() {
        let result = check(vec![
            func("helper").body(vec![]),
            func("main").body(vec![let_("f", var("helper"))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::TypeMismatch]);
    }

    #[test]
    fn test_arity_mismatch() {
        let result = check(vec![
            func("two").param("a", ty("Int")).param("b", ty("Int")).body(vec![]),
            func("main").body(vec![expr_stmt(call("two", vec![int(1)]))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::ArityMismatch]);
    }

    #[test]
    fn test_missing_return() {
        let result = check(vec![func("f")
            .param("c", ty("Bool"))
            .returns(ty("Int"))
            .body(vec![if_(var("c"), vec![ret(int(1))])])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::MissingReturn]);
    }

    #[test]
    fn test_if_else_both_returning_is_complete() {
        let result = check(vec![func("f")
            .param("c", ty("Bool"))
            .returns(ty("Int"))
            .body(vec![if_else(var("c"), vec![ret(int(1))], vec![ret(int(2))])])]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_break_outside_loop() {
        let result = check(vec![func("main").body(vec![brk()])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::InvalidControlFlow]);
    }

    #[test]
    fn test_struct_not_printable() {
        let result = check(vec![
            boxed(),
            func("main").body(vec![
                let_("b", struct_lit("Box", vec![("v", int(1))])),
                print(var("b")),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::NotPrintable]);
    }

    #[test]
    fn test_unknown_and_missing_fields() {
        let unknown = check(vec![
            boxed(),
            func("main").body(vec![let_("b", struct_lit("Box", vec![("v", int(1)), ("w", int(2))]))]),
        ]);
        assert_eq!(kinds(unknown), vec![DiagnosticKind::UnknownField]);

        let missing = check(vec![boxed(), func("main").body(vec![let_("b", struct_lit("Box", vec![]))])]);
        assert_eq!(kinds(missing), vec![DiagnosticKind::UnknownField]);
    }

    #[test]
    fn test_duplicate_definition() {
        let result = check(vec![func("f").body(vec![]), func("f").body(vec![])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::DuplicateDefinition]);
    }

    #[test]
    fn test_unknown_type_poisons_quietly() {
        // The broken signature is reported once; its caller stays quiet.
        let result = check(vec![
            func("broken").param("x", ty("Missing")).body(vec![]),
            func("main").body(vec![expr_stmt(call("broken", vec![int(1)]))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::UnresolvedType]);
    }

    #[test]
    fn test_ambiguous_type() {
        let result = check(vec![
            func("none").type_param("T", &[]).returns(nullable(ty("T"))).body(vec![ret(null())]),
            func("main").body(vec![let_("x", call("none", vec![]))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::AmbiguousType]);
    }

    #[test]
    fn test_explicit_type_argument_resolves_ambiguity() {
        let result = check(vec![
            func("none").type_param("T", &[]).returns(nullable(ty("T"))).body(vec![ret(null())]),
            func("main").body(vec![let_("x", call_with("none", vec![ty("Int")], vec![]))]),
        ]);
        let module = result.expect("checks");
        assert_eq!(find(&module, "main").bindings[0].ty, Type::nullable(Type::INT));
    }

    // -------------------------------------------------------------------------
    // Nullability
    // -------------------------------------------------------------------------

    #[test]
    fn test_nullable_arithmetic_rejected() {
        let result = check(vec![func("f")
            .param("x", nullable(ty("Int")))
            .returns(ty("Int"))
            .body(vec![ret(add(var("x"), int(1)))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::NullabilityViolation]);
    }

    #[test]
    fn test_null_passed_for_non_null_param() {
        let result = check(vec![
            func("takes").param("x", ty("Int")).body(vec![]),
            func("main").body(vec![expr_stmt(call("takes", vec![null()]))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::NullabilityViolation]);
    }

    #[test]
    fn test_guard_narrows_then_branch() {
        let result = check(vec![func("f")
            .param("x", nullable(ty("Int")))
            .returns(ty("Int"))
            .body(vec![if_(ne(var("x"), null()), vec![ret(add(var("x"), int(1)))]), ret(int(0))])]);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_mirror_guard_with_early_return_narrows_rest() {
        let result = check(vec![func("f")
            .param("x", nullable(ty("Int")))
            .returns(ty("Int"))
            .body(vec![if_(eq(var("x"), null()), vec![ret(int(0))]), ret(add(var("x"), int(1)))])]);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_narrowing_lost_after_merge() {
        let result = check(vec![func("f")
            .param("x", nullable(ty("Int")))
            .returns(ty("Int"))
            .body(vec![if_(ne(var("x"), null()), vec![print(var("x"))]), ret(add(var("x"), int(1)))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::NullabilityViolation]);
    }

    #[test]
    fn test_loop_assignment_widens() {
        let result = check(vec![func("f").param("x", nullable(ty("Int"))).body(vec![
            let_mut("y", var("x")),
            if_(
                ne(var("y"), null()),
                vec![while_(boolean(true), vec![print(add(var("y"), int(1))), assign(var("y"), null())])],
            ),
        ])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::NullabilityViolation]);
    }

    #[test]
    fn test_comparing_non_nullable_with_null() {
        let result = check(vec![func("f").param("x", ty("Int")).body(vec![print(eq(var("x"), null()))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::TypeMismatch]);
    }

    #[test]
    fn test_unannotated_null_flows_into_nullable() {
        let result = check(vec![func("main").body(vec![
            let_typed("x", nullable(ty("Str")), null()),
            if_(ne(var("x"), null()), vec![print(var("x"))]),
        ])]);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    // -------------------------------------------------------------------------
    // Generics
    // -------------------------------------------------------------------------

    #[test]
    fn test_generic_identity_instantiates() {
        let result = check(vec![
            func("id").type_param("T", &[]).param("x", ty("T")).returns(ty("T")).body(vec![ret(var("x"))]),
            func("main").body(vec![let_("a", call("id", vec![int(1)])), print(add(var("a"), int(1)))]),
        ]);
        let module = result.expect("checks");
        let main = find(&module, "main");
        let TypedStmtKind::Let { init, .. } = &main.body.stmts[0].kind else {
            panic!("expected let");
        };
        let TypedExprKind::Call { type_args, .. } = &init.kind else {
            panic!("expected call");
        };
        assert_eq!(type_args, &vec![Type::INT]);
    }

    #[test]
    fn test_bound_violation() {
        let result = check(vec![
            func("sum")
                .type_param("T", &["Num"])
                .param("a", ty("T"))
                .param("b", ty("T"))
                .returns(ty("T"))
                .body(vec![ret(add(var("a"), var("b")))]),
            func("main").body(vec![expr_stmt(call("sum", vec![boolean(true), boolean(false)]))]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::BoundViolation]);
    }

    #[test]
    fn test_unbounded_generic_has_no_operators() {
        let result = check(vec![func("bad")
            .type_param("T", &[])
            .param("a", ty("T"))
            .param("b", ty("T"))
            .returns(ty("T"))
            .body(vec![ret(add(var("a"), var("b")))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::TypeMismatch]);
    }

    // -------------------------------------------------------------------------
    // Ownership
    // -------------------------------------------------------------------------

    #[test]
    fn test_use_after_move() {
        let result = check(vec![
            boxed(),
            func("main").body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                let_("t", var("s")),
                print(field(var("s"), "v")),
            ]),
        ]);
        let diagnostics = result.expect_err("use after move");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::OwnershipViolation);
        assert_eq!(diagnostics[0].secondary.len(), 1);
    }

    #[test]
    fn test_copy_struct_is_duplicated() {
        let result = check(vec![
            structure("Point").copy().field("x", ty("Int")).build(),
            func("main").body(vec![
                let_("p", struct_lit("Point", vec![("x", int(1))])),
                let_("q", var("p")),
                print(field(var("p"), "x")),
                print(field(var("q"), "x")),
            ]),
        ]);
        let module = result.expect("copy values never move");
        let TypedStmtKind::Let { init, .. } = &find(&module, "main").body.stmts[1].kind else {
            panic!("expected let");
        };
        assert!(matches!(init.kind, TypedExprKind::Local { usage: Usage::Copy, .. }));
    }

    #[test]
    fn test_copy_struct_rejects_owned_field() {
        let result = check(vec![
            boxed(),
            structure("Pair").copy().field("inner", ty("Box")).build(),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::BoundViolation]);
    }

    #[test]
    fn test_conflicting_argument_borrows() {
        let result = check(vec![
            boxed(),
            func("both").param_ref_mut("a", ty("Box")).param_ref("b", ty("Box")).body(vec![]),
            func("main").body(vec![
                let_mut("s", struct_lit("Box", vec![("v", int(1))])),
                expr_stmt(call("both", vec![borrow_mut(var("s")), borrow(var("s"))])),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::OwnershipViolation]);
    }

    #[test]
    fn test_argument_borrow_released_after_call() {
        let result = check(vec![
            boxed(),
            consume(),
            func("peek").param_ref("b", ty("Box")).body(vec![]),
            func("main").body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                expr_stmt(call("peek", vec![var("s")])),
                expr_stmt(call("consume", vec![var("s")])),
            ]),
        ]);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_move_while_let_borrowed() {
        let result = check(vec![
            boxed(),
            consume(),
            func("main").body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                let_("r", borrow(var("s"))),
                expr_stmt(call("consume", vec![var("s")])),
                print(field(var("r"), "v")),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::OwnershipViolation]);
    }

    #[test]
    fn test_loop_move_reported() {
        let result = check(vec![
            boxed(),
            consume(),
            func("main").param("c", ty("Bool")).body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                while_(var("c"), vec![expr_stmt(call("consume", vec![var("s")]))]),
            ]),
        ]);
        let diagnostics = result.expect_err("moved in loop");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("previous iteration"));
    }

    #[test]
    fn test_loop_move_then_reinit_is_fine() {
        let result = check(vec![
            boxed(),
            consume(),
            func("main").param("c", ty("Bool")).body(vec![
                let_mut("s", struct_lit("Box", vec![("v", int(1))])),
                while_(
                    var("c"),
                    vec![
                        expr_stmt(call("consume", vec![var("s")])),
                        assign(var("s"), struct_lit("Box", vec![("v", int(2))])),
                    ],
                ),
            ]),
        ]);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn test_branch_move_records_reconciliation_drop() {
        let result = check(vec![
            boxed(),
            consume(),
            func("main").param("c", ty("Bool")).body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                if_(var("c"), vec![expr_stmt(call("consume", vec![var("s")]))]),
            ]),
        ]);
        let module = result.expect("checks");
        let main = find(&module, "main");
        let TypedStmtKind::If { then_drops, else_drops, .. } = &main.body.stmts[1].kind else {
            panic!("expected if");
        };
        assert!(then_drops.is_empty());
        assert_eq!(else_drops, &vec![1]);
    }

    #[test]
    fn test_break_records_drop() {
        let result = check(vec![
            boxed(),
            consume(),
            func("main").param("c", ty("Bool")).body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                while_(
                    boolean(true),
                    vec![
                        if_(var("c"), vec![expr_stmt(call("consume", vec![var("s")])), brk()]),
                        brk(),
                    ],
                ),
            ]),
        ]);
        let module = result.expect("checks");
        let main = find(&module, "main");
        let TypedStmtKind::While { body, .. } = &main.body.stmts[1].kind else {
            panic!("expected while");
        };
        let TypedStmtKind::Break { drops } = &body.stmts[1].kind else {
            panic!("expected break");
        };
        assert_eq!(drops, &vec![1]);
    }

    #[test]
    fn test_immutable_assignment() {
        let result = check(vec![func("main").body(vec![let_("x", int(1)), assign(var("x"), int(2))])]);
        assert_eq!(kinds(result), vec![DiagnosticKind::ImmutableAssignment]);
    }

    #[test]
    fn test_copy_struct_field_is_immutable() {
        let result = check(vec![
            structure("Point").copy().field("x", ty("Int")).build(),
            func("main").body(vec![
                let_mut("p", struct_lit("Point", vec![("x", int(1))])),
                assign(field(var("p"), "x"), int(2)),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::ImmutableAssignment]);
    }

    #[test]
    fn test_field_move_rejected() {
        let result = check(vec![
            boxed(),
            structure("Outer").field("inner", ty("Box")).build(),
            func("main").body(vec![
                let_("o", struct_lit("Outer", vec![("inner", struct_lit("Box", vec![("v", int(1))]))])),
                let_("i", field(var("o"), "inner")),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::OwnershipViolation]);
    }

    #[test]
    fn test_storing_object_in_its_own_field_rejected() {
        let node = structure("Node").field("v", ty("Int")).field("next", nullable(ty("Node"))).build();
        let new_node = |v| struct_lit("Node", vec![("v", int(v)), ("next", null())]);

        let result = check(vec![
            node.clone(),
            func("main").body(vec![let_mut("s", new_node(1)), assign(field(var("s"), "next"), var("s"))]),
        ]);
        let diagnostics = result.expect_err("self store");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::OwnershipViolation);
        assert!(diagnostics[0].message.contains("inside itself"), "{}", diagnostics[0].message);

        let linked = check(vec![
            node,
            func("main").body(vec![
                let_mut("s", new_node(1)),
                let_("t", new_node(2)),
                assign(field(var("s"), "next"), var("t")),
            ]),
        ]);
        assert!(linked.is_ok(), "{:?}", linked.err());
    }

    #[test]
    fn test_short_circuit_move_records_skip_drop() {
        let result = check(vec![
            boxed(),
            func("take").param("s", ty("Box")).returns(ty("Bool")).body(vec![ret(boolean(true))]),
            func("main").param("c", ty("Bool")).body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                print(and(var("c"), call("take", vec![var("s")]))),
            ]),
        ]);
        let module = result.expect("checks");
        let TypedStmtKind::Print(cond) = &find(&module, "main").body.stmts[1].kind else {
            panic!("expected print");
        };
        let TypedExprKind::Binary { skip_drops, .. } = &cond.kind else {
            panic!("expected binary");
        };
        assert_eq!(skip_drops, &vec![1]);
    }

    #[test]
    fn test_short_circuit_move_leaves_binding_moved() {
        let result = check(vec![
            boxed(),
            func("take").param("s", ty("Box")).returns(ty("Bool")).body(vec![ret(boolean(true))]),
            func("main").param("c", ty("Bool")).body(vec![
                let_("s", struct_lit("Box", vec![("v", int(1))])),
                print(or(var("c"), call("take", vec![var("s")]))),
                print(field(var("s"), "v")),
            ]),
        ]);
        assert_eq!(kinds(result), vec![DiagnosticKind::OwnershipViolation]);
    }

    // -------------------------------------------------------------------------
    // Visibility and batching
    // -------------------------------------------------------------------------

    fn library() -> SymbolTable {
        let lib = module(
            "app",
            "lib",
            vec![
                structure("Secret")
                    .public()
                    .field_with("hidden", ty("Int"), Visibility::Private, None)
                    .field_with("shown", ty("Int"), Visibility::Public, Some(Visibility::Private))
                    .build(),
                func("internal").body(vec![]),
                func("make")
                    .public()
                    .returns(ty("Secret"))
                    .body(vec![ret(struct_lit("Secret", vec![("hidden", int(1)), ("shown", int(2))]))]),
            ],
        );
        let typed = check_module(&lib, &SymbolTable::new()).expect("library checks");
        let mut symbols = SymbolTable::new();
        symbols.register(&typed);
        symbols
    }

    #[test]
    fn test_private_field_read_denied() {
        let main = module(
            "app",
            "main",
            vec![func("main").body(vec![
                let_("s", call("lib::make", vec![])),
                print(field(var("s"), "hidden")),
                print(field(var("s"), "shown")),
            ])],
        );
        let result = check_module(&main, &library());
        assert_eq!(kinds(result), vec![DiagnosticKind::VisibilityViolation(AccessKind::ReadDenied)]);
    }

    #[test]
    fn test_field_write_visibility_separate_from_read() {
        let main = module(
            "app",
            "main",
            vec![func("main").body(vec![
                let_mut("s", call("lib::make", vec![])),
                assign(field(var("s"), "shown"), int(5)),
            ])],
        );
        let result = check_module(&main, &library());
        assert_eq!(kinds(result), vec![DiagnosticKind::VisibilityViolation(AccessKind::WriteDenied)]);
    }

    #[test]
    fn test_fully_qualified_path_from_other_package() {
        let main = module("other", "main", vec![func("main").body(vec![let_("s", call("app::lib::make", vec![]))])]);
        assert!(check_module(&main, &library()).is_ok());
    }

    #[test]
    fn test_diagnostics_batched_in_declaration_order() {
        let main = module(
            "app",
            "main",
            vec![
                boxed(),
                consume(),
                func("first").body(vec![let_typed("x", ty("Int"), boolean(true))]),
                func("second").body(vec![
                    let_("s", struct_lit("Box", vec![("v", int(1))])),
                    expr_stmt(call("consume", vec![var("s")])),
                    expr_stmt(call("consume", vec![var("s")])),
                    expr_stmt(call("lib::internal", vec![])),
                ]),
            ],
        );
        let result = check_module(&main, &library());
        assert_eq!(
            kinds(result),
            vec![
                DiagnosticKind::TypeMismatch,
                DiagnosticKind::OwnershipViolation,
                DiagnosticKind::VisibilityViolation(AccessKind::ReadDenied),
            ]
        );
    }

    // -------------------------------------------------------------------------
    // Erasure
    // -------------------------------------------------------------------------

    #[test]
    fn test_rechecking_erased_module_is_identity() {
        let source = module(
            "app",
            "main",
            vec![
                boxed(),
                consume(),
                func("id").type_param("T", &[]).param("x", ty("T")).returns(ty("T")).body(vec![ret(var("x"))]),
                func("main").param("c", ty("Bool")).body(vec![
                    let_("n", call("id", vec![int(41)])),
                    let_typed("maybe", nullable(ty("Int")), null()),
                    let_("s", struct_lit("Box", vec![("v", var("n"))])),
                    if_else(
                        ne(var("maybe"), null()),
                        vec![print(add(var("maybe"), var("n")))],
                        vec![expr_stmt(call("consume", vec![var("s")]))],
                    ),
                ]),
            ],
        );
        let first = check_module(&source, &SymbolTable::new()).expect("checks");
        let erased = erase_with_hints(&first);
        let second = check_module(&erased, &SymbolTable::new()).expect("erased module checks");
        assert_eq!(first, second);
    }
}
