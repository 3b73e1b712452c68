//! Bytecode module: constant pool, function table, code and debug spans

use std::collections::HashMap;

use tarn_ast::Span;

use crate::instruction::Instruction;

/// Magic bytes for bytecode files.
pub const MAGIC: [u8; 4] = *b"TARN";

/// Bytecode format version.
pub const VERSION: u32 = 1;

/// Where values of a struct type live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Reference-counted heap object
    Heap,
    /// Copied by value on the operand stack
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDesc {
    pub name: String,
    /// Field holds an owned heap value that is released with its parent
    pub owned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub name: String,
    pub storage: Storage,
    pub fields: Vec<FieldDesc>,
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Type(TypeDescriptor),
}

/// Hashable identity of a constant; floats compare by bit pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    Float(u64),
    Str(String),
    Type(TypeDescriptor),
}

impl ConstKey {
    fn of(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => ConstKey::Int(*v),
            Constant::Float(v) => ConstKey::Float(v.to_bits()),
            Constant::Str(s) => ConstKey::Str(s.clone()),
            Constant::Type(t) => ConstKey::Type(t.clone()),
        }
    }
}

/// Function table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub arity: u16,
    /// Parameters included
    pub local_slots: u16,
    /// Index of the first instruction in the code section
    pub code_offset: u32,
    pub code_len: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeModule {
    pub constants: Vec<Constant>,
    pub functions: Vec<FunctionEntry>,
    pub code: Vec<Instruction>,
    /// Source span per instruction, parallel to `code`
    pub spans: Vec<Span>,
    pub entry: u32,
}

impl BytecodeModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, index: u32) -> Option<&FunctionEntry> {
        self.functions.get(index as usize)
    }

    /// Code of one function; empty when the table entry is out of bounds
    pub fn code_of(&self, function: &FunctionEntry) -> &[Instruction] {
        let start = function.code_offset as usize;
        let end = start.saturating_add(function.code_len as usize);
        self.code.get(start..end).unwrap_or(&[])
    }

    pub fn span_at(&self, function: u32, offset: u32) -> Option<Span> {
        let entry = self.function(function)?;
        if offset >= entry.code_len {
            return None;
        }
        self.spans.get(entry.code_offset as usize + offset as usize).copied()
    }

    pub fn find_function(&self, name: &str) -> Option<u32> {
        self.functions.iter().position(|f| f.name == name).map(|i| i as u32)
    }

    pub fn constant(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn type_descriptor(&self, index: u32) -> Option<&TypeDescriptor> {
        match self.constant(index)? {
            Constant::Type(desc) => Some(desc),
            _ => None,
        }
    }
}

/// Deduplicating constant pool used while building a module
#[derive(Debug, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: HashMap<ConstKey, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant and return its index; equal constants share one entry
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = ConstKey::of(&constant);
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.constants.push(constant);
        self.index.insert(key, index);
        index
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn into_constants(self) -> Vec<Constant> {
        self.constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_dedup() {
        let mut pool = ConstantPool::new();
        let a = pool.add(Constant::Int(42));
        let b = pool.add(Constant::Int(42));
        let c = pool.add(Constant::Str("42".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_float_dedup_by_bits() {
        let mut pool = ConstantPool::new();
        let zero = pool.add(Constant::Float(0.0));
        let neg_zero = pool.add(Constant::Float(-0.0));
        let nan_a = pool.add(Constant::Float(f64::NAN));
        let nan_b = pool.add(Constant::Float(f64::NAN));
        assert_ne!(zero, neg_zero);
        assert_eq!(nan_a, nan_b);
    }

    #[test]
    fn test_type_descriptor_dedup() {
        let desc = TypeDescriptor {
            name: "app::main::Box".into(),
            storage: Storage::Heap,
            fields: vec![FieldDesc { name: "v".into(), owned: false }],
        };
        let mut pool = ConstantPool::new();
        let a = pool.add(Constant::Type(desc.clone()));
        let b = pool.add(Constant::Type(desc));
        assert_eq!(a, b);
    }
}
