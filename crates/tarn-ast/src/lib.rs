//! # Tarn AST
//!
//! Untyped abstract syntax tree consumed by the Tarn checker.
//! Trees are produced by an external parser (or by the [`build`] helpers)
//! and may be exchanged as JSON when the `serde` feature is enabled.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Core Types (kept in lib.rs - used by all modules)
// =============================================================================

/// Source location information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub file_id: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, file_id: usize) -> Self {
        Self { start, end, file_id }
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            file_id: self.file_id,
        }
    }
}

/// AST node wrapper that includes span information
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node<T> {
    pub span: Span,
    pub value: T,
}

impl<T> Node<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { span, value }
    }

    /// Replace the span, keeping the file id.
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.span = Span::new(start, end, self.span.file_id);
        self
    }
}

/// Identifier, possibly a `::`-separated path (`module::name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ident {
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn segments(&self) -> Vec<&str> {
        self.name.split("::").collect()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// =============================================================================
// Ownership and Visibility Annotations
// =============================================================================

/// How a parameter receives its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OwnershipKind {
    /// Argument is moved into the callee (default)
    #[default]
    Owned,
    /// Shared borrow (&)
    Shared,
    /// Exclusive borrow (&mut)
    Mut,
}

impl fmt::Display for OwnershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipKind::Owned => write!(f, "owned"),
            OwnershipKind::Shared => write!(f, "&"),
            OwnershipKind::Mut => write!(f, "&mut"),
        }
    }
}

/// Visibility modifier for items and fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Visibility {
    /// Only the declaring module
    #[default]
    Private,
    /// Any module of the same package
    Module,
    /// Unrestricted
    Public,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Module => write!(f, "module"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

// =============================================================================
// Module Declarations
// =============================================================================

pub mod types;
pub mod expr;
pub mod stmt;
pub mod decl;
pub mod module;
pub mod build;

pub use types::*;
pub use expr::*;
pub use stmt::*;
pub use decl::*;
pub use module::*;

// =============================================================================
// Tests
// =============================================================================
