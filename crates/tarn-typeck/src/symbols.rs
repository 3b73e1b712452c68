//! Read-only dependency map of already-checked modules

use std::collections::BTreeMap;

use crate::typed_ast::TypedModule;
use crate::types::{FunctionSig, QualifiedName, StructDef, StructLookup};

/// Signatures and struct definitions keyed by qualified name.
///
/// Built once per compilation unit from modules checked earlier and
/// never mutated while a module is being checked.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    structs: BTreeMap<QualifiedName, StructDef>,
    functions: BTreeMap<QualifiedName, FunctionSig>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export every item of a checked module
    pub fn register(&mut self, module: &TypedModule) {
        for def in &module.structs {
            self.insert_struct(def.clone());
        }
        for func in &module.functions {
            self.insert_function(func.sig.clone());
        }
    }

    pub fn insert_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name.clone(), def);
    }

    pub fn insert_function(&mut self, sig: FunctionSig) {
        self.functions.insert(sig.name.clone(), sig);
    }

    pub fn function(&self, name: &QualifiedName) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.structs.contains_key(name) || self.functions.contains_key(name)
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.structs.values()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSig> {
        self.functions.values()
    }
}

impl StructLookup for SymbolTable {
    fn struct_def(&self, name: &QualifiedName) -> Option<&StructDef> {
        self.structs.get(name)
    }
}
