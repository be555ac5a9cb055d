//! Glob pattern matching over slash-separated paths.
//!
//! Supported syntax:
//! - `*` matches zero or more characters within a path segment
//! - `**` matches zero or more characters across segments
//! - `?` matches exactly one character (never `/`)
//! - `[abc]`, `[a-z]` match one character from a set or range
//! - `[!abc]` or `[^abc]` match one character NOT in the set
//! - `{a,b,c}` brace expansion (matches any of the alternatives)
//! - `\` escapes the next character
//!
//! Matching is bounded: the backtracking matcher gives up after
//! `MAX_MATCH_CALLS` recursive steps, so adversarial patterns like
//! `*a*a*a...b` against long non-matching inputs cannot blow up
//! exponentially.

use std::cell::Cell;

/// Upper bound on recursive matcher steps for one `glob_match` call.
///
/// Far above anything a legitimate path pattern needs; a pattern that
/// exhausts it is treated as a non-match.
const MAX_MATCH_CALLS: usize = 100_000;

/// Match a path against a glob pattern.
///
/// The pattern must match the entire input. Brace groups are expanded first,
/// so `*.{rs,go}` matches `main.rs` or `main.go`.
///
/// # Examples
/// ```
/// use graft_glob::glob_match;
///
/// assert!(glob_match("*.txt", "notes.txt"));
/// assert!(glob_match("x/*.md", "x/1.md"));
/// assert!(!glob_match("x/*.md", "x/sub/1.md"));
/// assert!(glob_match("x/**/*.md", "x/sub/1.md"));
/// ```
pub fn glob_match(pattern: &str, input: &str) -> bool {
    // One work budget shared across all brace alternatives.
    let calls = Cell::new(0usize);
    for pat in expand_braces(pattern) {
        let pat: Vec<char> = pat.chars().collect();
        let input: Vec<char> = input.chars().collect();
        if match_at(&pat, 0, &input, 0, &calls) {
            return true;
        }
    }
    false
}

/// True if the pattern contains any unescaped glob metacharacter.
pub fn contains_meta(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' | '[' | '{' => return true,
            _ => {}
        }
    }
    false
}

/// Expand the first top-level `{a,b}` group and recurse.
///
/// Returns one pattern per combination; a pattern without braces comes back
/// unchanged. An unclosed `{` is treated as a literal character.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();

    let mut depth = 0usize;
    let mut start = None;
    let mut end = None;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => return vec![pattern.to_string()],
    };

    let prefix: String = chars[..start].iter().collect();
    let suffix: String = chars[end + 1..].iter().collect();
    let body: String = chars[start + 1..end].iter().collect();

    let mut out = Vec::new();
    for alt in split_alternatives(&body) {
        // Recurse to expand nested groups and any groups in the suffix.
        out.extend(expand_braces(&format!("{prefix}{alt}{suffix}")));
    }
    out
}

/// Split brace content on top-level commas.
fn split_alternatives(body: &str) -> Vec<String> {
    let mut alts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                alts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    alts.push(current);
    alts
}

/// Recursive matcher with backtracking for `*`.
///
/// Every step charges `calls`; once the budget is spent the match fails
/// instead of backtracking further.
fn match_at(pattern: &[char], pi: usize, input: &[char], ii: usize, calls: &Cell<usize>) -> bool {
    let spent = calls.get() + 1;
    if spent > MAX_MATCH_CALLS {
        return false;
    }
    calls.set(spent);

    if pi >= pattern.len() {
        return ii >= input.len();
    }

    match pattern[pi] {
        '*' => {
            // Consecutive stars collapse into one; two or more cross `/`.
            let mut next = pi;
            while next < pattern.len() && pattern[next] == '*' {
                next += 1;
            }
            let crosses = next - pi > 1;

            // Trailing star swallows the rest of the input, a single star
            // only up to the next separator.
            if next >= pattern.len() {
                return crosses || !input[ii..].contains(&'/');
            }

            let mut skip = 0;
            loop {
                if match_at(pattern, next, input, ii + skip, calls) {
                    return true;
                }
                if calls.get() >= MAX_MATCH_CALLS {
                    return false;
                }
                if ii + skip >= input.len() {
                    return false;
                }
                if !crosses && input[ii + skip] == '/' {
                    return false;
                }
                skip += 1;
            }
        }

        '?' => {
            ii < input.len() && input[ii] != '/' && match_at(pattern, pi + 1, input, ii + 1, calls)
        }

        '[' => {
            if ii >= input.len() || input[ii] == '/' {
                return false;
            }
            let (matched, consumed) = match_class(&pattern[pi..], input[ii]);
            matched && match_at(pattern, pi + consumed, input, ii + 1, calls)
        }

        '\\' if pi + 1 < pattern.len() => {
            ii < input.len()
                && pattern[pi + 1] == input[ii]
                && match_at(pattern, pi + 2, input, ii + 1, calls)
        }

        c => ii < input.len() && c == input[ii] && match_at(pattern, pi + 1, input, ii + 1, calls),
    }
}

/// Match one character against a `[...]` class.
///
/// Returns (matched, chars consumed from the pattern). An unclosed class is
/// treated as a literal `[`.
fn match_class(pattern: &[char], ch: char) -> (bool, usize) {
    debug_assert_eq!(pattern[0], '[');

    let mut idx = 1;
    let mut negate = false;
    if idx < pattern.len() && (pattern[idx] == '!' || pattern[idx] == '^') {
        negate = true;
        idx += 1;
    }

    // `]` directly after the opening bracket is a literal member.
    let first = idx;
    let mut matched = false;
    let mut closed = false;

    while idx < pattern.len() {
        let c = pattern[idx];
        if c == ']' && idx > first {
            idx += 1;
            closed = true;
            break;
        }
        if idx + 2 < pattern.len() && pattern[idx + 1] == '-' && pattern[idx + 2] != ']' {
            if ch >= c && ch <= pattern[idx + 2] {
                matched = true;
            }
            idx += 3;
            continue;
        }
        if c == ch {
            matched = true;
        }
        idx += 1;
    }

    if !closed {
        return (ch == '[', 1);
    }
    (if negate { !matched } else { matched }, idx)
}
