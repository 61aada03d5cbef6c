//! Glob patterns for key invalidation.

use regex::Regex;

use crate::error::CacheError;

/// Translate a glob (`*`, `?`, `[...]`) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let invalid = |reason: &str| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }

    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '^' || c == '[' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated character class"));
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');

    Regex::new(&out).map_err(|e| invalid(&e.to_string()))
}
