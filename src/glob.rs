//! Wildcard matching for directory lookups.
//!
//! Supports:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - Any other character matches itself
//!
//! Names are flat (no directory components), so `*` also matches `/`.

/// A point where a `*` could absorb more of the name.
#[derive(Debug, Clone, Copy)]
struct StarPoint {
    /// Pattern index just past the `*`.
    pattern: usize,
    /// Name index the `*` currently stops at.
    name: usize,
}

/// Returns `true` if `name` matches the wildcard `pattern`.
///
/// Matching uses an explicit stack of `*` decision points instead of
/// recursion, so auxiliary space is bounded by the number of stars in the
/// pattern rather than by call depth.
///
/// # Example
///
/// ```rust
/// use tarlite::glob::glob_match;
///
/// assert!(glob_match("*.bin", "alpha.bin"));
/// assert!(glob_match("a?c", "abc"));
/// assert!(!glob_match("a?c", "abbc"));
/// ```
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let mut stack: Vec<StarPoint> = Vec::new();
    let mut p = 0;
    let mut n = 0;

    loop {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    // Collapse runs of stars; they are equivalent to one.
                    while p < pattern.len() && pattern[p] == '*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    stack.push(StarPoint { pattern: p, name: n });
                    continue;
                }
                '?' if n < name.len() => {
                    p += 1;
                    n += 1;
                    continue;
                }
                c if n < name.len() && c == name[n] => {
                    p += 1;
                    n += 1;
                    continue;
                }
                _ => {}
            }
        } else if n == name.len() {
            return true;
        }

        // Mismatch: lengthen the most recent star that still has room,
        // dropping exhausted decision points.
        loop {
            let Some(top) = stack.last_mut() else {
                return false;
            };
            if top.name < name.len() {
                top.name += 1;
                p = top.pattern;
                n = top.name;
                break;
            }
            stack.pop();
        }
    }
}

/// A compiled wildcard pattern.
///
/// Holds the pattern text so it can be applied to many names, as the
/// archive's `find_first`/`find_next` cursor does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobMatcher {
    pattern: String,
}

impl GlobMatcher {
    /// Creates a matcher for `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Returns the pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if `name` matches this pattern.
    pub fn is_match(&self, name: &str) -> bool {
        glob_match(&self.pattern, name)
    }
}
