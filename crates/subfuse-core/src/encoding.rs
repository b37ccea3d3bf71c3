//! Relaxed base64 decoding for subscription payloads
//!
//! Wild subscription bodies and share links mix standard and URL-safe
//! alphabets and frequently drop padding; decode tolerantly.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

/// Decode base64 accepting both alphabets, with or without padding
pub fn decode_base64_relaxed(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.split_whitespace().collect();
    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(decoded) = engine.decode(compact.as_bytes()) {
            return Some(decoded);
        }
    }
    None
}

/// Decode base64 to UTF-8 text
pub fn decode_base64_text(input: &str) -> Option<String> {
    decode_base64_relaxed(input).and_then(|bytes| String::from_utf8(bytes).ok())
}
