//! Pulling a JSON object out of free-form model output.
//!
//! Models wrap their payload in code fences or surround it with prose. The
//! extractor scans for a balanced top-level object, tracking string literals
//! so braces inside strings never move the boundary.

use serde_json::Value;

/// Return the first balanced `{...}` span that parses as a JSON object.
pub fn extract_object(text: &str) -> Option<&str> {
    let mut from = 0;

    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(end) = balanced_end(text, start) {
            let candidate = &text[start..=end];
            if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_))) {
                return Some(candidate);
            }
        }
        from = start + 1;
    }

    None
}

/// Byte index of the `}` closing the object opened at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
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
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}
