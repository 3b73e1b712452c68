//! Checker diagnostics

use std::fmt;

use tarn_ast::Span;
use thiserror::Error;

/// Which side of an access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    ReadDenied,
    WriteDenied,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::ReadDenied => write!(f, "read denied"),
            AccessKind::WriteDenied => write!(f, "write denied"),
        }
    }
}

/// Diagnostic kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    TypeMismatch,
    InfiniteType,
    UnresolvedVariable,
    UnresolvedType,
    UnknownField,
    ArityMismatch,
    NullabilityViolation,
    OwnershipViolation,
    VisibilityViolation(AccessKind),
    ImmutableAssignment,
    DuplicateDefinition,
    BoundViolation,
    MissingReturn,
    InvalidControlFlow,
    AmbiguousType,
    NotPrintable,
}

impl DiagnosticKind {
    /// Stable short code used by renderers
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::TypeMismatch => "E0001",
            DiagnosticKind::InfiniteType => "E0002",
            DiagnosticKind::UnresolvedVariable => "E0003",
            DiagnosticKind::UnresolvedType => "E0004",
            DiagnosticKind::UnknownField => "E0005",
            DiagnosticKind::ArityMismatch => "E0006",
            DiagnosticKind::NullabilityViolation => "E0007",
            DiagnosticKind::OwnershipViolation => "E0008",
            DiagnosticKind::VisibilityViolation(AccessKind::ReadDenied) => "E0009",
            DiagnosticKind::VisibilityViolation(AccessKind::WriteDenied) => "E0010",
            DiagnosticKind::ImmutableAssignment => "E0011",
            DiagnosticKind::DuplicateDefinition => "E0012",
            DiagnosticKind::BoundViolation => "E0013",
            DiagnosticKind::MissingReturn => "E0014",
            DiagnosticKind::InvalidControlFlow => "E0015",
            DiagnosticKind::AmbiguousType => "E0016",
            DiagnosticKind::NotPrintable => "E0017",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::TypeMismatch => write!(f, "type mismatch"),
            DiagnosticKind::InfiniteType => write!(f, "infinite type"),
            DiagnosticKind::UnresolvedVariable => write!(f, "unresolved variable"),
            DiagnosticKind::UnresolvedType => write!(f, "unresolved type"),
            DiagnosticKind::UnknownField => write!(f, "unknown field"),
            DiagnosticKind::ArityMismatch => write!(f, "arity mismatch"),
            DiagnosticKind::NullabilityViolation => write!(f, "nullability violation"),
            DiagnosticKind::OwnershipViolation => write!(f, "ownership violation"),
            DiagnosticKind::VisibilityViolation(access) => write!(f, "visibility violation ({})", access),
            DiagnosticKind::ImmutableAssignment => write!(f, "immutable assignment"),
            DiagnosticKind::DuplicateDefinition => write!(f, "duplicate definition"),
            DiagnosticKind::BoundViolation => write!(f, "bound violation"),
            DiagnosticKind::MissingReturn => write!(f, "missing return"),
            DiagnosticKind::InvalidControlFlow => write!(f, "invalid control flow"),
            DiagnosticKind::AmbiguousType => write!(f, "ambiguous type"),
            DiagnosticKind::NotPrintable => write!(f, "not printable"),
        }
    }
}

/// A checker diagnostic with its primary location and related notes
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub secondary: Vec<(Span, String)>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self { kind, span, secondary: Vec::new(), message: message.into() }
    }

    pub fn with_note(mut self, span: Span, note: impl Into<String>) -> Self {
        self.secondary.push((span, note.into()));
        self
    }
}

pub type CheckResult<T> = Result<T, Diagnostic>;
