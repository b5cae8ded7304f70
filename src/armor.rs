//! Base64 text form of ciphertext blobs
//!
//! Standard alphabet with padding, on a single line. Decoding tolerates
//! surrounding whitespace such as the trailing newline an editor adds.

use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Encode bytes as base64 text.
pub fn wrap(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode base64 text back into bytes.
pub fn unwrap(text: &str) -> Result<Vec<u8>> {
    STANDARD.decode(text.trim()).map_err(|e| {
        BoxcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedBase64,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })
}

/// Decode the raw contents of a text file.
///
/// Content that is not UTF-8 cannot be base64 and is reported as such.
pub fn unwrap_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        BoxcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedBase64,
            "input is not valid UTF-8 text",
            e,
        )
    })?;
    unwrap(text)
}
