//! Seeded random programs. Every generated program is well typed and
//! ownership-correct, so it must run to completion without leaking or
//! touching a freed object.

mod common;

use common::{build, check_all, run_with};
use pretty_assertions::assert_eq;
use tarn_ast::build::*;
use tarn_ast::{Expr, Module, Node, Stmt};
use tarn_typeck::{check_module, erase_with_hints, DiagnosticKind, SymbolTable};
use tarn_vm::{Value, VmConfig};

const SEEDS: u64 = 300;

#[derive(Debug, Clone)]
struct Var {
    name: String,
    pair: bool,
    mutable: bool,
    available: bool,
}

struct ProgramGen {
    rng: fastrand::Rng,
    next_id: usize,
    budget: usize,
    /// Index of the first variable declared inside each enclosing loop
    loops: Vec<usize>,
    /// Variables moved on a `break` path, per enclosing loop
    break_moves: Vec<Vec<usize>>,
    /// Emit `c.next = c` instead of linking a fresh node
    self_store: bool,
    chains: usize,
}

impl ProgramGen {
    fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            next_id: 0,
            budget: 40,
            loops: Vec::new(),
            break_moves: Vec::new(),
            self_store: false,
            chains: 0,
        }
    }

    /// A generator whose programs store a node inside itself at least once
    fn with_self_store(seed: u64) -> Self {
        Self { self_store: true, ..Self::new(seed) }
    }

    fn program(&mut self) -> Module {
        let mut vars = Vec::new();
        let mut body = vec![let_("r", int(self.rng.i64(0..10)))];
        body.extend(self.block(&mut vars, 0));
        if self.self_store && self.chains == 0 {
            self.chain(&mut body);
        }
        module(
            "app",
            "main",
            vec![
                structure("Box").field("v", ty("Int")).build(),
                structure("Pair").field("left", ty("Box")).field("right", nullable(ty("Box"))).build(),
                structure("Chain").field("v", ty("Int")).field("next", nullable(ty("Chain"))).build(),
                func("consume").param("b", ty("Box")).body(vec![]),
                func("peek").param_ref("b", ty("Box")).returns(ty("Int")).body(vec![ret(field(var("b"), "v"))]),
                func("take")
                    .param("b", ty("Box"))
                    .returns(ty("Bool"))
                    .body(vec![ret(gt(field(var("b"), "v"), int(50)))]),
                func("make")
                    .param("v", ty("Int"))
                    .returns(ty("Box"))
                    .body(vec![ret(struct_lit("Box", vec![("v", var("v"))]))]),
                func("main").body(body),
            ],
        )
    }

    fn fresh(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn new_box(&mut self) -> Node<Expr> {
        struct_lit("Box", vec![("v", int(self.rng.i64(0..100)))])
    }

    fn cond(&mut self) -> Node<Expr> {
        match self.rng.u8(0..3) {
            0 => boolean(self.rng.bool()),
            _ => lt(var("r"), int(self.rng.i64(0..10))),
        }
    }

    fn new_chain(&mut self) -> Node<Expr> {
        struct_lit("Chain", vec![("v", int(self.rng.i64(0..100))), ("next", null())])
    }

    /// A node with a second node linked behind it, or linked to itself
    fn chain(&mut self, out: &mut Vec<Node<Stmt>>) {
        self.chains += 1;
        let name = self.fresh("k");
        let head = self.new_chain();
        out.push(let_mut(&name, head));
        let next = if self.self_store { var(&name) } else { self.new_chain() };
        out.push(assign(field(var(&name), "next"), next));
    }

    fn loop_base(&self) -> usize {
        self.loops.last().copied().unwrap_or(0)
    }

    fn pick(&mut self, vars: &[Var], allowed: impl Fn(usize, &Var) -> bool) -> Option<usize> {
        let candidates: Vec<usize> = vars.iter().enumerate().filter(|(i, v)| allowed(*i, v)).map(|(i, _)| i).collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[self.rng.usize(0..candidates.len())])
        }
    }

    fn block(&mut self, vars: &mut Vec<Var>, depth: usize) -> Vec<Node<Stmt>> {
        let scope_start = vars.len();
        let mut stmts = Vec::new();
        for _ in 0..self.rng.usize(1..5) {
            if self.budget == 0 {
                break;
            }
            self.budget -= 1;
            self.stmt(vars, depth, &mut stmts);
        }
        vars.truncate(scope_start);
        stmts
    }

    fn stmt(&mut self, vars: &mut Vec<Var>, depth: usize, out: &mut Vec<Node<Stmt>>) {
        let base = self.loop_base();
        let in_loop = !self.loops.is_empty();
        match self.rng.u8(0..16) {
            0 => {
                let name = self.fresh("b");
                let mutable = self.rng.bool();
                let init = self.new_box();
                out.push(if mutable { let_mut(&name, init) } else { let_(&name, init) });
                vars.push(Var { name, pair: false, mutable, available: true });
            }
            1 => {
                let name = self.fresh("p");
                let left = self.new_box();
                out.push(let_mut(&name, struct_lit("Pair", vec![("left", left), ("right", null())])));
                vars.push(Var { name, pair: true, mutable: true, available: true });
            }
            2 => match self.pick(vars, |i, v| !v.pair && v.available && i >= base) {
                Some(i) => {
                    out.push(expr_stmt(call("consume", vec![var(&vars[i].name)])));
                    vars[i].available = false;
                }
                None => out.push(expr_stmt(call("make", vec![int(0)]))),
            },
            3 => {
                if let Some(i) = self.pick(vars, |_, v| !v.pair && v.available) {
                    out.push(print(call("peek", vec![borrow(var(&vars[i].name))])));
                }
            }
            4 => {
                if let Some(i) = self.pick(vars, |_, v| v.pair && v.available) {
                    let value = self.new_box();
                    out.push(assign(field(var(&vars[i].name), "right"), value));
                }
            }
            5 => {
                if let Some(i) = self.pick(vars, |_, v| v.pair && v.available) {
                    out.push(print(field(field(var(&vars[i].name), "left"), "v")));
                }
            }
            6 => {
                if let Some(i) = self.pick(vars, |i, v| !v.pair && v.mutable && (v.available || i >= base)) {
                    let value = self.new_box();
                    out.push(assign(var(&vars[i].name), value));
                    vars[i].available = true;
                }
            }
            7 => {
                if let Some(i) = self.pick(vars, |_, v| !v.pair && v.available) {
                    let name = self.fresh("b");
                    out.push(let_(&name, clone_of(var(&vars[i].name))));
                    vars.push(Var { name, pair: false, mutable: false, available: true });
                }
            }
            8 => {
                let arg = int(self.rng.i64(0..100));
                out.push(expr_stmt(call("make", vec![arg])));
            }
            9 if depth < 3 => {
                let cond = self.cond();
                let mut then_vars = vars.clone();
                let then_block = self.block(&mut then_vars, depth + 1);
                let mut else_vars = vars.clone();
                let stmt = if self.rng.bool() {
                    let else_block = self.block(&mut else_vars, depth + 1);
                    if_else(cond, then_block, else_block)
                } else {
                    if_(cond, then_block)
                };
                for (i, v) in vars.iter_mut().enumerate() {
                    v.available = then_vars[i].available && else_vars[i].available;
                }
                out.push(stmt);
            }
            10 if depth < 3 => {
                let counter = self.fresh("c");
                out.push(let_mut(&counter, int(0)));
                let bound = self.rng.i64(0..4);
                let step = assign(var(&counter), add(var(&counter), int(1)));

                // `while true` exits right after the step so `continue` cannot spin
                let unbounded = self.rng.bool();
                let mut body = vec![step];
                if unbounded {
                    body.push(if_(gt(var(&counter), int(bound)), vec![brk()]));
                }

                self.loops.push(vars.len());
                self.break_moves.push(Vec::new());
                body.extend(self.block(vars, depth + 1));
                self.loops.pop();
                let moved = self.break_moves.pop().unwrap_or_default();

                let stmt = if unbounded {
                    while_(boolean(true), body)
                } else {
                    while_(lt(var(&counter), int(bound)), body)
                };
                for i in moved {
                    vars[i].available = false;
                }
                out.push(stmt);
            }
            11 if in_loop => {
                let parent = self.loops.iter().rev().nth(1).copied().unwrap_or(0);
                let cond = self.cond();
                match self.pick(vars, |i, v| !v.pair && v.available && i < base && i >= parent) {
                    Some(i) => {
                        out.push(if_(cond, vec![expr_stmt(call("consume", vec![var(&vars[i].name)])), brk()]));
                        if let Some(moves) = self.break_moves.last_mut() {
                            moves.push(i);
                        }
                    }
                    None => out.push(if_(cond, vec![brk()])),
                }
            }
            12 if in_loop => {
                let cond = self.cond();
                out.push(if_(cond, vec![cont()]));
            }
            13 => {
                let cond = self.cond();
                out.push(if_(cond, vec![ret_unit()]));
            }
            // The move happens on one side of the short circuit only
            14 => {
                if let Some(i) = self.pick(vars, |i, v| !v.pair && v.available && i >= base) {
                    let cond = self.cond();
                    let take = call("take", vec![var(&vars[i].name)]);
                    out.push(print(if self.rng.bool() { and(cond, take) } else { or(cond, take) }));
                    vars[i].available = false;
                }
            }
            15 => self.chain(out),
            _ => {
                if let Some(i) = self.pick(vars, |_, v| !v.pair && v.available) {
                    out.push(print(field(var(&vars[i].name), "v")));
                }
            }
        }
    }
}

#[test]
fn test_random_programs_free_every_object() {
    for seed in 0..SEEDS {
        let program = ProgramGen::new(seed).program();
        let outcome = run_with(build(&[program]), VmConfig::default());
        assert_eq!(outcome.result, Ok(Value::Unit), "seed {}", seed);
        assert_eq!(outcome.live_objects, 0, "seed {} leaked", seed);
    }
}

#[test]
fn test_random_programs_reject_self_stores() {
    for seed in 0..SEEDS {
        let program = ProgramGen::with_self_store(seed).program();
        let diagnostics = check_module(&program, &SymbolTable::new()).expect_err("self store accepted");
        assert!(
            diagnostics.iter().all(|d| d.kind == DiagnosticKind::OwnershipViolation),
            "seed {}: {:#?}",
            seed,
            diagnostics
        );
        assert!(diagnostics.iter().any(|d| d.message.contains("inside itself")), "seed {}", seed);
    }
}

#[test]
fn test_random_programs_compile_deterministically() {
    for seed in 0..SEEDS {
        let program = ProgramGen::new(seed).program();
        let first = build(&[program.clone()]).to_bytes();
        let second = build(&[program]).to_bytes();
        assert_eq!(first, second, "seed {}", seed);
    }
}

#[test]
fn test_random_programs_run_deterministically() {
    for seed in 0..SEEDS {
        let module = build(&[ProgramGen::new(seed).program()]);
        let first = run_with(module.clone(), VmConfig::default());
        let second = run_with(module, VmConfig::default());
        assert_eq!(first.output, second.output, "seed {}", seed);
    }
}

#[test]
fn test_random_programs_recheck_after_erasure() {
    for seed in 0..SEEDS {
        let typed = check_all(&[ProgramGen::new(seed).program()]);
        let erased = erase_with_hints(&typed[0]);
        let rechecked = check_module(&erased, &SymbolTable::new()).expect("erased module checks");
        assert_eq!(typed[0], rechecked, "seed {}", seed);
    }
}
