//! # Tarn Virtual Machine
//!
//! Executes verified bytecode modules on an explicit call stack with a
//! reference-counted heap. Every unsafe runtime condition ends execution
//! with a [`Trap`].

mod config;
mod heap;
mod output;
mod trap;
mod value;
mod vm;

pub use config::VmConfig;
pub use heap::HeapRef;
pub use output::OutputSink;
pub use trap::{Trap, TrapKind};
pub use value::Value;
pub use vm::Vm;
