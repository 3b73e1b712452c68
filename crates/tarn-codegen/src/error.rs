//! Error types for bytecode generation

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("entry point `{0}` is not defined in the compiled modules")]
    UnknownEntry(String),

    #[error("entry point `{name}` takes {arity} parameter(s); it must take none")]
    EntryTakesParameters { name: String, arity: usize },

    #[error("entry point `{0}` is generic")]
    GenericEntry(String),

    #[error("function `{callee}` called from `{caller}` is not part of the compiled modules")]
    UnresolvedFunction { callee: String, caller: String },

    #[error("{what} does not fit its operand in `{function}`")]
    OperandOverflow { what: &'static str, function: String },

    #[error("more than {limit} generic instantiations (last: `{name}`); is there polymorphic recursion?")]
    InstantiationLimit { limit: usize, name: String },

    #[error("internal compiler error in `{function}`: {message}")]
    Internal { function: String, message: String },
}
