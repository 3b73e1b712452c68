//! Check, compile and run stages

use tarn_bytecode::BytecodeModule;
use tarn_codegen::{CodegenError, CompilerOptions};
use tarn_typeck::{check_module, ModuleId, QualifiedName, SymbolTable, TypedModule};
use tarn_vm::{Value, Vm, VmConfig};
use tracing::debug;

use crate::error::{DriverError, Location};
use crate::input::SourceModule;

/// Entry point used when none is named
pub const DEFAULT_ENTRY: &str = "main";

/// Check modules in order, each against the symbols of those before it.
/// Stops at the first module with diagnostics.
pub fn check(sources: &[SourceModule]) -> Result<Vec<TypedModule>, DriverError> {
    let mut symbols = SymbolTable::new();
    let mut typed = Vec::with_capacity(sources.len());
    for source in sources {
        match check_module(&source.module, &symbols) {
            Ok(module) => {
                debug!(module = %module.id, functions = module.functions.len(), "checked module");
                symbols.register(&module);
                typed.push(module);
            }
            Err(diagnostics) => {
                return Err(DriverError::Check {
                    path: source.path.clone(),
                    text: source.text.clone(),
                    diagnostics,
                })
            }
        }
    }
    Ok(typed)
}

/// Resolve an entry name the way calls are resolved from the last module:
/// `name`, `module::name` or `package::module::name`.
pub fn entry_name(name: &str, last: &ModuleId) -> Result<QualifiedName, DriverError> {
    let parts: Vec<&str> = name.split("::").collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(DriverError::EntryName(name.to_string()));
    }
    match parts.as_slice() {
        [name] => Ok(last.qualify(*name)),
        [module, name] => Ok(ModuleId::new(last.package.clone(), *module).qualify(*name)),
        [package, module, name] => Ok(ModuleId::new(*package, *module).qualify(*name)),
        _ => Err(DriverError::EntryName(name.to_string())),
    }
}

/// Check and compile AST modules into one bytecode module
pub fn compile(
    sources: &[SourceModule],
    entry: Option<&str>,
    options: &CompilerOptions,
) -> Result<BytecodeModule, DriverError> {
    let typed = check(sources)?;
    let last = typed.last().ok_or_else(|| DriverError::Input(anyhow::anyhow!("no input modules")))?;
    let entry = entry_name(entry.unwrap_or(DEFAULT_ENTRY), &last.id)?;
    Ok(tarn_codegen::compile(&typed, &entry, options)?)
}

/// Point a decoded module at another function of its table. A bare name
/// matches the last path segment of a table entry.
pub fn select_entry(module: &mut BytecodeModule, name: &str) -> Result<(), DriverError> {
    let index = module.find_function(name).or_else(|| {
        let suffix = format!("::{}", name);
        module.functions.iter().position(|f| f.name.ends_with(&suffix)).map(|i| i as u32)
    });
    module.entry = index.ok_or_else(|| CodegenError::UnknownEntry(name.to_string()))?;
    Ok(())
}

/// Run a module to completion. Program output goes to stdout.
pub fn execute(module: BytecodeModule, config: VmConfig, sources: &[SourceModule]) -> Result<Value, DriverError> {
    let mut vm = Vm::new(module, config)?;
    vm.run().map_err(|trap| {
        let module = vm.module();
        let function = module.function(trap.function).map(|f| f.name.clone()).unwrap_or_default();
        let location = module.span_at(trap.function, trap.offset).map(|span| {
            let source = sources.iter().find(|s| s.module.span.file_id == span.file_id);
            Location {
                path: source.map(|s| s.path.clone()).unwrap_or_default(),
                text: source.and_then(|s| s.text.clone()),
                span,
            }
        });
        DriverError::Trap { trap, function, location }
    })
}
