//! Fatal runtime conditions

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TrapKind {
    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("call stack overflow")]
    StackOverflow,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand of the wrong kind")]
    InvalidOperand,

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("dangling heap reference")]
    DanglingReference,
}

/// A trap and the instruction that raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} in function #{function} at offset {offset}")]
pub struct Trap {
    pub kind: TrapKind,
    /// Function table index
    pub function: u32,
    /// Instruction index within the function
    pub offset: u32,
}
