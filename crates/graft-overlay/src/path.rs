//! Overlay path rules.
//!
//! Overlay paths are slash-separated, cleaned, and relative; `"."` names
//! the root. Absolute paths, `..`, and empty segments are rejected at
//! every API boundary.

use crate::error::{OverlayError, Result};

/// Clean a path, rejecting anything outside the overlay namespace.
pub fn clean(input: &str) -> Result<String> {
    if input.is_empty() || input == "." {
        return Ok(".".to_string());
    }
    if input.starts_with('/') {
        return Err(OverlayError::InvalidPath(format!(
            "absolute path: {input}"
        )));
    }
    let mut parts = Vec::new();
    for segment in input.split('/') {
        match segment {
            "." => {}
            "" => {
                return Err(OverlayError::InvalidPath(format!(
                    "empty segment: {input}"
                )));
            }
            ".." => {
                return Err(OverlayError::InvalidPath(format!(
                    "parent traversal: {input}"
                )));
            }
            seg => parts.push(seg),
        }
    }
    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(parts.join("/"))
    }
}

/// Parent directory of a cleaned path; `"."` for top-level names.
pub fn dirname(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => ".",
    }
}

/// Join a cleaned base with a relative suffix.
pub fn join(base: &str, rel: &str) -> String {
    if base == "." {
        rel.to_string()
    } else if rel == "." {
        base.to_string()
    } else {
        format!("{base}/{rel}")
    }
}

/// `target` relative to `base`; `"."` when they are equal.
pub fn relative(base: &str, target: &str) -> String {
    if base == "." {
        return target.to_string();
    }
    if target == base {
        return ".".to_string();
    }
    match target.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => target.to_string(),
    }
}
