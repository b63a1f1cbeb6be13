//! Dot/bracket path addressing into JSON values.
//!
//! `items[0].name` and `items.0.name` are equivalent: bracket indexes
//! normalize to dotted segments before the walk.

use serde_json::Value;

/// Converts bracket indexing to dotted form: `items[0].name` →
/// `items.0.name`.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                if !out.is_empty() && !out.ends_with('.') {
                    out.push('.');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    out.push(inner);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Walks `root` along a normalized or bracketed path. Numeric segments
/// index arrays; everything else keys objects.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = normalize(path);
    let mut current = root;
    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
