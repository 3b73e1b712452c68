//! Tarn Driver Library
//!
//! Loads AST modules or encoded bytecode from disk, runs them through the
//! checker, compiler and virtual machine, and renders failures for a
//! terminal.

pub mod error;
pub mod input;
pub mod pipeline;
pub mod report;

pub use error::{DriverError, Location};
pub use input::{Inputs, SourceModule};
