//! Bytecode decoding and verification errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a tarn bytecode file (bad magic)")]
    BadMagic,

    #[error("unsupported bytecode version {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of input at byte {offset}")]
    Truncated { offset: usize },

    #[error("invalid {what} tag {tag} at byte {offset}")]
    InvalidTag { what: &'static str, tag: u8, offset: usize },

    #[error("invalid UTF-8 string at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{0} trailing bytes after module")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("entry function index {0} is out of range")]
    EntryOutOfRange(u32),

    #[error("entry function `{name}` takes {arity} argument(s); it must take none")]
    EntryTakesArguments { name: String, arity: u16 },

    #[error("function `{function}` has no code")]
    EmptyFunction { function: String },

    #[error("function `{function}` code range lies outside the code section")]
    CodeOutOfRange { function: String },

    #[error("function `{function}` declares {local_slots} slot(s) for {arity} parameter(s)")]
    SlotsBelowArity { function: String, arity: u16, local_slots: u16 },

    #[error("function `{function}` does not end in `ret` or `jump`")]
    MissingTerminator { function: String },

    #[error("debug table has {spans} entries for {code} instructions")]
    SpanTableMismatch { spans: usize, code: usize },

    #[error("`{function}`+{offset}: {mnemonic} operand {operand} is out of range")]
    OperandOutOfRange { function: String, offset: u32, mnemonic: &'static str, operand: u32 },

    #[error("`{function}`+{offset}: {mnemonic} expects a {expected} constant at index {operand}")]
    WrongConstantKind {
        function: String,
        offset: u32,
        mnemonic: &'static str,
        expected: &'static str,
        operand: u32,
    },

    #[error("`{function}`+{offset}: call to `{callee}` passes {found} argument(s), expected {expected}")]
    CallArity { function: String, offset: u32, callee: String, expected: u16, found: u16 },
}
