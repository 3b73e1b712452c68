//! Check, compile, and run helpers shared by the pipeline tests

use tarn_ast::Module;
use tarn_bytecode::BytecodeModule;
use tarn_codegen::CompilerOptions;
use tarn_typeck::{check_module, ModuleId, SymbolTable, TypedModule};
use tarn_vm::{Trap, Value, Vm, VmConfig};

/// Check every module in order, each against the symbols of those before it.
pub fn check_all(modules: &[Module]) -> Vec<TypedModule> {
    let mut symbols = SymbolTable::new();
    let mut typed = Vec::new();
    for module in modules {
        let checked = check_module(module, &symbols)
            .unwrap_or_else(|diags| panic!("{}::{} failed to check: {:#?}", module.package, module.name, diags));
        symbols.register(&checked);
        typed.push(checked);
    }
    typed
}

/// Compile with `app::main::main` as the entry point
pub fn build(modules: &[Module]) -> BytecodeModule {
    let typed = check_all(modules);
    let entry = ModuleId::new("app", "main").qualify("main");
    tarn_codegen::compile(&typed, &entry, &CompilerOptions::default()).expect("compiles")
}

pub struct Outcome {
    pub result: Result<Value, Trap>,
    pub output: String,
    pub live_objects: usize,
}

pub fn run_with(module: BytecodeModule, config: VmConfig) -> Outcome {
    let mut vm = Vm::new(module, config).expect("verifies").capture_output();
    let result = vm.run();
    Outcome { result, output: vm.output().unwrap_or_default().to_string(), live_objects: vm.live_objects() }
}

pub fn run(modules: &[Module]) -> Outcome {
    run_with(build(modules), VmConfig::default())
}
