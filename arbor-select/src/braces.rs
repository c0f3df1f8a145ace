use itertools::Itertools;

/// Expands the brace alternations in `spec` into every pattern it denotes.
///
/// Each group `{a,b,c}` is replaced by each of its comma-separated alternatives. Groups nest,
/// and are substituted innermost first, scanning left to right. `\{` and `\}` are literal
/// braces. A group without a comma is not an alternation and is kept as literal text, so column
/// names that genuinely contain braces can still be requested.
///
/// The result contains no duplicates and lists patterns in the order they were generated.
///
/// ```
/// use arbor_select::expand_braces;
///
/// assert_eq!(expand_braces("pt_{x,y}"), vec!["pt_x", "pt_y"]);
/// assert_eq!(expand_braces("var{5}"), vec!["var{5}"]);
/// ```
pub fn expand_braces(spec: &str) -> Vec<String> {
    let mut expanded = Vec::new();
    expand_into(spec.to_string(), &mut expanded);
    expanded.into_iter().unique().collect()
}

fn expand_into(spec: String, expanded: &mut Vec<String>) {
    let Some((open, close)) = innermost_group(&spec) else {
        expanded.push(unescape(&spec));
        return;
    };

    let prefix = &spec[..open];
    let body = &spec[open + 1..close];
    let suffix = &spec[close + 1..];

    let alternatives = split_alternatives(body);
    if alternatives.len() > 1 {
        for alternative in alternatives {
            expand_into(format!("{prefix}{alternative}{suffix}"), expanded);
        }
    } else {
        // Not an alternation, escape the braces so the scan moves past this group.
        expand_into(format!("{prefix}\\{{{body}\\}}{suffix}"), expanded);
    }
}

/// Byte offsets of the opening and closing brace of the first group to close.
///
/// The first unescaped `}` always closes a group that contains no other unescaped group.
fn innermost_group(spec: &str) -> Option<(usize, usize)> {
    let bytes = spec.as_bytes();
    let mut open = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if matches!(bytes.get(pos + 1), Some(b'{' | b'}')) => pos += 1,
            b'{' => open.push(pos),
            b'}' => {
                if let Some(start) = open.pop() {
                    return Some((start, pos));
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

/// Splits the body of a group on the commas that are not inside escaped braces.
fn split_alternatives(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if bytes.get(pos + 1) == Some(&b'{') => {
                depth += 1;
                pos += 1;
            }
            b'\\' if bytes.get(pos + 1) == Some(&b'}') => {
                depth = depth.saturating_sub(1);
                pos += 1;
            }
            b',' if depth == 0 => {
                alternatives.push(&body[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
        pos += 1;
    }
    alternatives.push(&body[start..]);
    alternatives
}

fn unescape(spec: &str) -> String {
    spec.replace("\\{", "{").replace("\\}", "}")
}
