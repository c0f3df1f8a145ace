use std::fmt::{Display, Formatter};

use arbor_error::{ArborResult, arbor_err};
use regex::Regex;

/// Whether `pattern` contains any shell wildcard.
#[inline]
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// A compiled shell-style wildcard pattern.
///
/// `*` matches any run of characters, `?` any single character, `[seq]` any character in `seq`
/// and `[!seq]` any character not in `seq`. Matching is case-sensitive and always covers the
/// whole name. A `[` without a closing `]` is a literal bracket.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile `pattern`.
    pub fn new(pattern: &str) -> ArborResult<Self> {
        let regex = Regex::new(&translate(pattern)).map_err(|err| {
            arbor_err!(InvalidArgument: "Invalid column pattern '{}': {}", pattern, err)
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` matches this pattern.
    #[inline]
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl Display for GlobPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn translate(pattern: &str) -> String {
    let chars = pattern.chars().collect::<Vec<_>>();
    let mut out = String::from("(?s)^");
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        pos += 1;
        match c {
            '*' => {
                while chars.get(pos) == Some(&'*') {
                    pos += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => match class_end(&chars, pos) {
                Some(end) => {
                    push_class(&mut out, &chars[pos..end]);
                    pos = end + 1;
                }
                None => out.push_str("\\["),
            },
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }
    out.push('$');
    out
}

/// Position of the `]` closing a class whose body starts at `start`.
///
/// A `]` directly after the opening `[` or `[!` belongs to the class.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut pos = start;
    if chars.get(pos) == Some(&'!') {
        pos += 1;
    }
    if chars.get(pos) == Some(&']') {
        pos += 1;
    }
    (pos..chars.len()).find(|&p| chars[p] == ']')
}

/// Append the regex class for the glob class `body`.
///
/// `a-z` is a range. A reversed range such as `z-a` matches nothing, as in `fnmatch`, and a
/// class left without members matches no character at all.
fn push_class(out: &mut String, body: &[char]) {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };

    let mut members = String::new();
    let mut pos = 0;
    while pos < body.len() {
        match body.get(pos..pos + 3) {
            Some(&[lo, '-', hi]) => {
                if lo <= hi {
                    push_class_char(&mut members, lo);
                    members.push('-');
                    push_class_char(&mut members, hi);
                }
                pos += 3;
            }
            _ => {
                push_class_char(&mut members, body[pos]);
                pos += 1;
            }
        }
    }

    match (members.is_empty(), negated) {
        (true, true) => out.push('.'),
        (true, false) => out.push_str("[^\\x{0}-\\x{10FFFF}]"),
        (false, true) => {
            out.push_str("[^");
            out.push_str(&members);
            out.push(']');
        }
        (false, false) => {
            out.push('[');
            out.push_str(&members);
            out.push(']');
        }
    }
}

fn push_class_char(members: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '-') {
        members.push('\\');
    }
    members.push(c);
}
