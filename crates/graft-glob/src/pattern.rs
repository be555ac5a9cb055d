//! Compiled glob patterns.

use crate::PatternError;
use crate::glob::{contains_meta, expand_braces, glob_match};

/// A validated glob pattern.
///
/// Compiling expands brace groups once up front and rejects malformed
/// syntax, so matching is infallible afterwards.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    alternatives: Vec<String>,
}

impl Pattern {
    /// Compile a pattern, validating its syntax.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        validate(pattern)?;
        Ok(Self {
            source: pattern.to_string(),
            alternatives: expand_braces(pattern),
        })
    }

    /// The original pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a path against the compiled pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.alternatives.iter().any(|alt| glob_match(alt, path))
    }

    /// Longest literal directory prefixes before any metacharacter, one per
    /// brace alternative, deduplicated in first-seen order.
    ///
    /// Walking each base and filtering by [`Pattern::matches`] visits every
    /// possible match; `"."` is the fallback when a pattern has no literal
    /// prefix. Base extraction is an optimisation only.
    pub fn bases(&self) -> Vec<String> {
        let mut bases = Vec::new();
        for alt in &self.alternatives {
            let base = literal_base(alt);
            if !bases.contains(&base) {
                bases.push(base);
            }
        }
        bases
    }
}

/// Literal directory prefix of a single brace-free pattern.
fn literal_base(pattern: &str) -> String {
    if !contains_meta(pattern) {
        return unescape(pattern);
    }
    let mut parts = Vec::new();
    for segment in pattern.split('/') {
        if contains_meta(segment) {
            break;
        }
        parts.push(unescape(segment));
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Reject unclosed `[` classes and `{` groups.
fn validate(pattern: &str) -> Result<(), PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => brace_depth += 1,
            '}' if brace_depth > 0 => brace_depth -= 1,
            '[' => {
                // Skip a leading negation and a literal `]` member, then
                // require a closing bracket.
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(PatternError::UnclosedClass(pattern.to_string()));
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    if brace_depth > 0 {
        return Err(PatternError::UnclosedBrace(pattern.to_string()));
    }
    Ok(())
}
