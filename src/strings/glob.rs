//! GLOB pattern matching
//!
//! Case-sensitive SQLite GLOB semantics:
//! - `*` matches any sequence, including the empty one
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from the set
//! - `[^abc]` matches one character outside the set
//!
//! A `]` directly after `[` or `[^` is a literal member of the set. An
//! unterminated `[` matches a literal `[`.

use regex::Regex;

#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
    is_equality: bool,
}

impl GlobMatcher {
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        let is_equality = !pattern.contains(['*', '?', '[']);
        let regex = Regex::new(&translate(pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            is_equality,
        })
    }

    pub fn matches(&self, input: &str) -> bool {
        if self.is_equality {
            return self.pattern == input;
        }
        self.regex.is_match(input)
    }

    /// True when the pattern has no metacharacters, so matching is plain
    /// string equality against the pattern.
    pub fn is_equality(&self) -> bool {
        self.is_equality
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?s:");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push_str(".*");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => match translate_class(&chars, i) {
                Some((class, next)) => {
                    out.push_str(&class);
                    i = next;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                i += 1;
            }
        }
    }

    out.push_str(")$");
    out
}

/// Translates the bracket expression starting at `start` (which holds `[`).
/// Returns the regex class and the position after the closing `]`, or
/// `None` when the bracket is unterminated.
fn translate_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let mut class = String::from("[");

    if chars.get(i) == Some(&'^') {
        class.push('^');
        i += 1;
    }

    let body_start = i;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && i != body_start {
            break;
        }
        let first = i == body_start;
        let last = chars.get(i + 1) == Some(&']');
        match c {
            '-' if first || last => class.push_str(r"\-"),
            '-' => class.push('-'),
            '\\' | '[' | ']' | '&' | '~' | '^' => {
                class.push('\\');
                class.push(c);
            }
            _ => class.push(c),
        }
        i += 1;
    }

    class.push(']');
    Some((class, i + 1))
}
