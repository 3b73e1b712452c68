//! # Tarn Bytecode Compiler
//!
//! Lowers checked modules to a single [`BytecodeModule`]: slot allocation,
//! control flow, drop insertion for owned values and monomorphization of
//! generic functions.

mod error;
mod layout;
mod translator;

pub use error::CodegenError;

use std::collections::{BTreeMap, HashMap, VecDeque};

use tarn_ast::Span;
use tarn_bytecode::{BytecodeModule, Constant, ConstantPool, FunctionEntry, Instruction, Storage};
use tarn_typeck::{QualifiedName, Type, TypedFunction, TypedModule};
use tracing::debug;

use crate::layout::Layouts;
use crate::translator::FunctionTranslator;

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Upper bound on generic instantiations per compilation
    pub instantiation_limit: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { instantiation_limit: 256 }
    }
}

/// Compile checked modules into one bytecode module whose entry point is
/// `entry`. The same input always yields an identical module.
pub fn compile(
    modules: &[TypedModule],
    entry: &QualifiedName,
    options: &CompilerOptions,
) -> Result<BytecodeModule, CodegenError> {
    CodeGenerator::new(modules, options).compile(entry)
}

/// A function body waiting to be translated
struct Job<'a> {
    index: u32,
    func: &'a TypedFunction,
    type_args: Vec<Type>,
}

/// Whole-program code generator
pub struct CodeGenerator<'a> {
    modules: &'a [TypedModule],
    options: &'a CompilerOptions,
    layouts: Layouts<'a>,
    /// Every function of the compiled modules by name
    functions: BTreeMap<QualifiedName, &'a TypedFunction>,
    /// Function table index per function and type arguments
    func_index_map: HashMap<(QualifiedName, Vec<Type>), u32>,
    /// Translated in first-in first-out order, which is also table order
    pending: VecDeque<Job<'a>>,
    constants: ConstantPool,
    table: Vec<FunctionEntry>,
    code: Vec<Instruction>,
    spans: Vec<Span>,
    instantiations: usize,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(modules: &'a [TypedModule], options: &'a CompilerOptions) -> Self {
        let functions = modules
            .iter()
            .flat_map(|m| m.functions.iter())
            .map(|f| (f.sig.name.clone(), f))
            .collect();
        Self {
            modules,
            options,
            layouts: Layouts::new(modules),
            functions,
            func_index_map: HashMap::new(),
            pending: VecDeque::new(),
            constants: ConstantPool::new(),
            table: Vec::new(),
            code: Vec::new(),
            spans: Vec::new(),
            instantiations: 0,
        }
    }

    pub fn compile(mut self, entry: &QualifiedName) -> Result<BytecodeModule, CodegenError> {
        // Non-generic functions first, in module then declaration order
        let modules = self.modules;
        for func in modules.iter().flat_map(|m| m.functions.iter()) {
            if !func.is_generic() {
                self.declare_function(func, Vec::new(), func.sig.name.to_string())?;
            }
        }
        let entry = self.entry_index(entry)?;

        while let Some(job) = self.pending.pop_front() {
            self.compile_function(job)?;
        }

        debug!(
            functions = self.table.len(),
            constants = self.constants.len(),
            instructions = self.code.len(),
            "compiled bytecode module"
        );
        Ok(BytecodeModule {
            constants: self.constants.into_constants(),
            functions: self.table,
            code: self.code,
            spans: self.spans,
            entry,
        })
    }

    fn entry_index(&self, entry: &QualifiedName) -> Result<u32, CodegenError> {
        let func = self.functions.get(entry).ok_or_else(|| CodegenError::UnknownEntry(entry.to_string()))?;
        if func.is_generic() {
            return Err(CodegenError::GenericEntry(entry.to_string()));
        }
        if !func.params.is_empty() {
            return Err(CodegenError::EntryTakesParameters { name: entry.to_string(), arity: func.params.len() });
        }
        self.func_index_map
            .get(&(entry.clone(), Vec::new()))
            .copied()
            .ok_or_else(|| CodegenError::UnknownEntry(entry.to_string()))
    }

    /// Reserve a table slot and queue the body for translation
    fn declare_function(
        &mut self,
        func: &'a TypedFunction,
        type_args: Vec<Type>,
        name: String,
    ) -> Result<u32, CodegenError> {
        let overflow = |what| CodegenError::OperandOverflow { what, function: name.clone() };
        let index = u32::try_from(self.table.len()).map_err(|_| overflow("function index"))?;
        let arity = u16::try_from(func.params.len()).map_err(|_| overflow("parameter count"))?;
        self.table.push(FunctionEntry { name, arity, local_slots: 0, code_offset: 0, code_len: 0 });
        self.func_index_map.insert((func.sig.name.clone(), type_args.clone()), index);
        self.pending.push_back(Job { index, func, type_args });
        Ok(index)
    }

    /// Function table index of a call target, instantiating generic callees
    pub(crate) fn resolve_call(
        &mut self,
        callee: &QualifiedName,
        type_args: Vec<Type>,
        caller: &str,
    ) -> Result<u32, CodegenError> {
        let key = (callee.clone(), type_args);
        if let Some(index) = self.func_index_map.get(&key) {
            return Ok(*index);
        }
        let (_, type_args) = key;
        let func = *self.functions.get(callee).ok_or_else(|| CodegenError::UnresolvedFunction {
            callee: callee.to_string(),
            caller: caller.to_string(),
        })?;
        if func.sig.type_params.len() != type_args.len() {
            return Err(CodegenError::Internal {
                function: caller.to_string(),
                message: format!(
                    "`{}` expects {} type argument(s), got {}",
                    callee,
                    func.sig.type_params.len(),
                    type_args.len()
                ),
            });
        }

        let name = instance_name(callee, &type_args);
        self.instantiations += 1;
        if self.instantiations > self.options.instantiation_limit {
            return Err(CodegenError::InstantiationLimit { limit: self.options.instantiation_limit, name });
        }
        debug!(instance = %name, requested_by = caller, "queued instantiation");
        self.declare_function(func, type_args, name)
    }

    /// Constant index of a struct's type descriptor
    pub(crate) fn type_constant(&mut self, name: &QualifiedName) -> Option<(u32, Storage)> {
        let desc = self.layouts.descriptor(name)?;
        let storage = desc.storage;
        Some((self.constants.add(Constant::Type(desc)), storage))
    }

    fn compile_function(&mut self, job: Job<'a>) -> Result<(), CodegenError> {
        let subst = job
            .func
            .sig
            .type_params
            .iter()
            .map(|tp| tp.name.clone())
            .zip(job.type_args.iter().cloned())
            .collect();
        let name = self.table[job.index as usize].name.clone();
        let translated = FunctionTranslator::new(self, job.func, subst, name.clone()).translate()?;

        let overflow = || CodegenError::OperandOverflow { what: "code size", function: name.clone() };
        let code_offset = u32::try_from(self.code.len()).map_err(|_| overflow())?;
        let code_len = u32::try_from(translated.code.len()).map_err(|_| overflow())?;
        code_offset.checked_add(code_len).ok_or_else(overflow)?;

        debug!(function = %name, slots = translated.local_slots, instructions = code_len, "compiled function");
        let entry = &mut self.table[job.index as usize];
        entry.local_slots = translated.local_slots;
        entry.code_offset = code_offset;
        entry.code_len = code_len;
        self.code.extend(translated.code);
        self.spans.extend(translated.spans);
        Ok(())
    }
}

/// `pkg::mod::id<Int, Str>`
fn instance_name(callee: &QualifiedName, type_args: &[Type]) -> String {
    let args: Vec<String> = type_args.iter().map(Type::to_string).collect();
    format!("{}<{}>", callee, args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tarn_ast::build::*;
    use tarn_ast::{Item, Node};
    use tarn_bytecode::{disassemble, verify, Opcode};
    use tarn_typeck::{check_module, ModuleId, SymbolTable};

    fn checked(items: Vec<Node<Item>>) -> TypedModule {
        match check_module(&module("app", "main", items), &SymbolTable::new()) {
            Ok(typed) => typed,
            Err(diagnostics) => panic!("check failed: {:?}", diagnostics),
        }
    }

    fn main_name() -> QualifiedName {
        ModuleId::new("app", "main").qualify("main")
    }

    fn build(items: Vec<Node<Item>>) -> BytecodeModule {
        let typed = checked(items);
        let module = compile(&[typed], &main_name(), &CompilerOptions::default()).unwrap();
        verify(&module).unwrap();
        module
    }

    fn ops(module: &BytecodeModule, function: &str) -> Vec<Opcode> {
        let index = module.find_function(function).unwrap();
        let entry = module.function(index).unwrap();
        module.code_of(entry).iter().filter_map(Instruction::opcode).collect()
    }

    fn boxed() -> Node<Item> {
        structure("Box").field("v", ty("Int")).build()
    }

    #[test]
    fn test_arithmetic_listing() {
        let module = build(vec![func("main")
            .returns(ty("Int"))
            .body(vec![ret(add(int(2), mul(int(3), int(4))))])]);
        let expected = "\
module (1 functions, 3 constants, entry 0)
constants:
     0: int 2
     1: int 3
     2: int 4

fn #0 app::main::main (arity 0, slots 0):
     0: push.const 0 ; int 2
     1: push.const 1 ; int 3
     2: push.const 2 ; int 4
     3: mul.i
     4: add.i
     5: ret
";
        assert_eq!(disassemble(&module), expected);
    }

    #[test]
    fn test_output_is_deterministic() {
        let items = || {
            vec![
                boxed(),
                func("id").type_param("T", &[]).param("x", ty("T")).returns(ty("T")).body(vec![ret(var("x"))]),
                func("main").body(vec![
                    let_("a", call("id", vec![int(1)])),
                    let_("b", call("id", vec![string("s")])),
                    let_("c", call("id", vec![struct_lit("Box", vec![("v", int(1))])])),
                    print(var("a")),
                ]),
            ]
        };
        let a = build(items());
        let b = build(items());
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_instances_follow_discovery_order() {
        let module = build(vec![
            func("id").type_param("T", &[]).param("x", ty("T")).returns(ty("T")).body(vec![ret(var("x"))]),
            func("main").body(vec![
                expr_stmt(call("id", vec![string("a")])),
                expr_stmt(call("id", vec![int(1)])),
                expr_stmt(call("id", vec![string("b")])),
            ]),
        ]);
        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["app::main::main", "app::main::id<Str>", "app::main::id<Int>"]);
    }

    #[test]
    fn test_owned_let_dropped_at_scope_end() {
        let module = build(vec![
            boxed(),
            func("main").body(vec![let_("b", struct_lit("Box", vec![("v", int(1))]))]),
        ]);
        assert_eq!(
            ops(&module, "app::main::main"),
            vec![Opcode::PushConst, Opcode::Alloc, Opcode::StoreLocal, Opcode::Drop, Opcode::PushUnit, Opcode::Return]
        );
    }

    #[test]
    fn test_moved_binding_not_dropped() {
        let module = build(vec![
            boxed(),
            func("consume").param("b", ty("Box")).body(vec![]),
            func("main").body(vec![
                let_("b", struct_lit("Box", vec![("v", int(1))])),
                expr_stmt(call("consume", vec![var("b")])),
            ]),
        ]);
        let main = ops(&module, "app::main::main");
        assert!(!main.contains(&Opcode::Drop));
        // the callee releases its owned parameter
        assert_eq!(ops(&module, "app::main::consume"), vec![Opcode::Drop, Opcode::PushUnit, Opcode::Return]);
    }

    #[test]
    fn test_sibling_scopes_share_slots() {
        let module = build(vec![func("main").body(vec![
            block(vec![let_("a", int(1)), print(var("a"))]),
            block(vec![let_("b", int(2)), let_("c", int(3)), print(var("c"))]),
        ])]);
        assert_eq!(module.functions[0].local_slots, 2);
    }

    #[test]
    fn test_reassignment_drops_old_value() {
        let module = build(vec![
            boxed(),
            func("main").body(vec![
                let_mut("b", struct_lit("Box", vec![("v", int(1))])),
                assign(var("b"), struct_lit("Box", vec![("v", int(2))])),
            ]),
        ]);
        let main = ops(&module, "app::main::main");
        let drops = main.iter().filter(|op| **op == Opcode::Drop).count();
        assert_eq!(drops, 2);
        let store = main.iter().rposition(|op| *op == Opcode::StoreLocal).unwrap();
        assert_eq!(main[store - 1], Opcode::Drop);
    }

    #[test]
    fn test_discarded_owned_call_result() {
        let module = build(vec![
            boxed(),
            func("make").returns(ty("Box")).body(vec![ret(struct_lit("Box", vec![("v", int(1))]))]),
            func("main").body(vec![expr_stmt(call("make", vec![]))]),
        ]);
        assert!(ops(&module, "app::main::main").contains(&Opcode::DropTop));
    }

    #[test]
    fn test_while_true_has_no_exit_test() {
        let module = build(vec![func("main").body(vec![while_(boolean(true), vec![brk()])])]);
        assert!(!ops(&module, "app::main::main").contains(&Opcode::JumpIfFalse));
    }

    #[test]
    fn test_conditional_move_reconciled() {
        let module = build(vec![
            boxed(),
            func("consume").param("b", ty("Box")).body(vec![]),
            func("main").body(vec![
                let_("b", struct_lit("Box", vec![("v", int(1))])),
                if_(boolean(true), vec![expr_stmt(call("consume", vec![var("b")]))]),
            ]),
        ]);
        // one drop on the path that skipped the move; none at scope end
        let main = ops(&module, "app::main::main");
        assert_eq!(main.iter().filter(|op| **op == Opcode::Drop).count(), 1);
    }

    #[test]
    fn test_unknown_entry() {
        let typed = checked(vec![func("start").body(vec![])]);
        let err = compile(&[typed], &main_name(), &CompilerOptions::default()).unwrap_err();
        assert_eq!(err, CodegenError::UnknownEntry("app::main::main".into()));
    }

    #[test]
    fn test_entry_with_parameters() {
        let typed = checked(vec![func("main").param("n", ty("Int")).body(vec![])]);
        let err = compile(&[typed], &main_name(), &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CodegenError::EntryTakesParameters { arity: 1, .. }));
    }

    #[test]
    fn test_instantiation_limit() {
        let typed = checked(vec![
            func("id").type_param("T", &[]).param("x", ty("T")).returns(ty("T")).body(vec![ret(var("x"))]),
            func("main").body(vec![
                expr_stmt(call("id", vec![int(1)])),
                expr_stmt(call("id", vec![string("s")])),
            ]),
        ]);
        let options = CompilerOptions { instantiation_limit: 1 };
        let err = compile(&[typed], &main_name(), &options).unwrap_err();
        assert_eq!(err, CodegenError::InstantiationLimit { limit: 1, name: "app::main::id<Str>".into() });
    }
}
