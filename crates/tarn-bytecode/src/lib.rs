//! # Tarn Bytecode
//!
//! Stack-machine instruction set, module container with a deduplicating
//! constant pool, binary encoding, verifier and disassembler.

mod disasm;
mod encode;
mod error;
mod instruction;
mod module;
mod opcode;
mod verify;

pub use disasm::{disassemble, disassemble_instruction};
pub use error::{DecodeError, VerifyError};
pub use instruction::Instruction;
pub use module::{
    BytecodeModule, Constant, ConstantPool, FieldDesc, FunctionEntry, Storage, TypeDescriptor, MAGIC, VERSION,
};
pub use opcode::{Opcode, OperandKind};
pub use verify::verify;
