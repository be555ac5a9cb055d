//! graft-glob: Shell-style glob matching for overlay paths.
//!
//! Provides:
//! - **glob_match**: segment-aware glob matching with brace expansion
//! - **Pattern**: a compiled, validated pattern with base-prefix extraction
//!
//! Patterns operate on slash-separated relative paths. A single `*` or `?`
//! never crosses a `/`; a doubled `**` does. `{a,b}` brace alternatives are
//! expanded before matching.

mod glob;
mod pattern;

pub use glob::{contains_meta, expand_braces, glob_match};
pub use pattern::Pattern;

use thiserror::Error;

/// Errors raised while compiling a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unclosed character class in pattern: {0}")]
    UnclosedClass(String),
    #[error("unclosed brace group in pattern: {0}")]
    UnclosedBrace(String),
    #[error("empty pattern")]
    Empty,
}
