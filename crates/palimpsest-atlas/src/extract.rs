//! Lenient JSON extraction from free-text transform output
//!
//! Model responses are prose: the JSON payload may be wrapped in code fences,
//! preceded by commentary, or followed by a sign-off. The extractor scans for
//! the first balanced object or array substring and parses only that,
//! tolerating everything around it.

use crate::error::AtlasError;
use serde::de::DeserializeOwned;

/// Extract the first balanced JSON object or array substring
///
/// String literals (including escaped quotes and brackets inside strings) are
/// skipped while balancing. Returns `None` when no balanced payload exists.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;

    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None; // mismatched closer, not valid JSON
                }
                if stack.is_empty() {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and deserialize a payload of type `T`
///
/// # Errors
/// [`AtlasError::NoJsonPayload`] when no balanced substring exists, or
/// [`AtlasError::Parse`] when the substring does not deserialize to `T`.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, AtlasError> {
    let payload = extract_json(text).ok_or(AtlasError::NoJsonPayload)?;
    Ok(serde_json::from_str(payload)?)
}
