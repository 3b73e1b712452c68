//! Driver failures and their process exit codes

use std::path::PathBuf;

use tarn_ast::Span;
use tarn_bytecode::VerifyError;
use tarn_codegen::CodegenError;
use tarn_typeck::Diagnostic;
use tarn_vm::Trap;
use thiserror::Error;

/// Exit code for rejected programs
pub const EXIT_PROGRAM: u8 = 65;
/// Exit code for unreadable or malformed input
pub const EXIT_INPUT: u8 = 66;
/// Exit code for runtime traps
pub const EXIT_TRAP: u8 = 70;
/// Exit code for output that could not be written
pub const EXIT_OUTPUT: u8 = 74;

/// A source file and a span inside it
#[derive(Debug, Clone)]
pub struct Location {
    pub path: PathBuf,
    /// Program text, when a `.tarn` file sits next to the AST
    pub text: Option<String>,
    pub span: Span,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0:#}")]
    Input(anyhow::Error),

    #[error("{}: {} error(s)", .path.display(), .diagnostics.len())]
    Check {
        path: PathBuf,
        text: Option<String>,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("invalid entry point name `{0}`")]
    EntryName(String),

    #[error(transparent)]
    Compile(#[from] CodegenError),

    #[error("bytecode rejected: {0}")]
    Verify(#[from] VerifyError),

    #[error("runtime error in `{function}`: {trap}")]
    Trap {
        trap: Trap,
        function: String,
        location: Option<Location>,
    },

    #[error("cannot write `{}`: {}", .path.display(), .error)]
    Output { path: PathBuf, error: std::io::Error },
}

impl DriverError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DriverError::Input(_) | DriverError::Verify(_) => EXIT_INPUT,
            DriverError::Check { .. } | DriverError::EntryName(_) | DriverError::Compile(_) => EXIT_PROGRAM,
            DriverError::Trap { .. } => EXIT_TRAP,
            DriverError::Output { .. } => EXIT_OUTPUT,
        }
    }
}

impl From<anyhow::Error> for DriverError {
    fn from(err: anyhow::Error) -> Self {
        DriverError::Input(err)
    }
}
