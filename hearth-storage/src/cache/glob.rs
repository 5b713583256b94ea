//! Glob patterns for pattern deletes (`prefix:*`).

use regex::Regex;

/// A compiled glob supporting `*` (any run) and `?` (any single char).
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob. Returns `None` if the resulting expression is invalid.
    pub fn new(pattern: &str) -> Option<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        Regex::new(&expr).ok().map(|regex| Self { regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
