//! Pulling JSON objects out of free-form model output.
//!
//! Models asked for "JSON only" still wrap it in prose or code fences. Two
//! strategies live here: a brace matcher for the generator, and a bounded
//! whole-text-then-substring parser for the reviewer.

use serde_json::{Map, Value};

/// Upper bound on substring parses tried by [`parse_object_lenient`].
pub const MAX_PARSE_ATTEMPTS: usize = 256;

/// Upper bound on opening braces [`first_balanced_object`] starts from.
pub const MAX_OBJECT_STARTS: usize = 64;

/// First balanced `{...}` span in `text`. Braces inside JSON string
/// literals are ignored. Gives up after [`MAX_OBJECT_STARTS`] unclosed
/// starts.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    for _ in 0..MAX_OBJECT_STARTS {
        let offset = text[search_from..].find('{')?;
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            return Some(&text[start..start + end]);
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the object starting at `s[0] == '{'`, if it closes.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object out of a model response.
///
/// Phase 1 parses the whole trimmed text. Phase 2 starts at the first `{`
/// and tries progressively shorter substrings, longest first, returning the
/// first that parses. Only ends right after a `}` can close an object, so
/// those are the only candidates, and at most [`MAX_PARSE_ATTEMPTS`] are
/// tried.
pub fn parse_object_lenient(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(obj);
    }

    let start = text.find('{')?;
    let tail = &text[start..];
    tail.rmatch_indices('}')
        .take(MAX_PARSE_ATTEMPTS)
        .find_map(|(i, _)| match serde_json::from_str::<Value>(&tail[..=i]) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        })
}
