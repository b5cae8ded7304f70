//! Key material resolution
//!
//! Turns a user-supplied key string into the raw 32 bytes the cipher
//! needs. The string is interpreted either as base64 or as its own UTF-8
//! bytes; which one is always an explicit choice of the caller.

use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Length of a key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// How a key string maps to key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// The string is base64 (standard alphabet, padded) of the raw key.
    #[default]
    Base64,
    /// The raw key is the UTF-8 encoding of the string itself, no BOM.
    Utf8,
}

impl FromStr for KeyEncoding {
    type Err = BoxcryptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(KeyEncoding::Base64),
            "utf8" | "utf-8" => Ok(KeyEncoding::Utf8),
            other => Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("unknown key encoding {other:?}; expected base64 or utf8"),
            )),
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Base64 => f.write_str("base64"),
            KeyEncoding::Utf8 => f.write_str("utf8"),
        }
    }
}

/// Raw key bytes for one invocation.
///
/// The bytes are wiped when the value is dropped. `Debug` never prints
/// them.
pub struct KeyMaterial {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl KeyMaterial {
    /// Resolves `input` into key bytes according to `encoding`.
    pub fn resolve(input: &str, encoding: KeyEncoding) -> Result<Self> {
        let decoded = match encoding {
            KeyEncoding::Base64 => Zeroizing::new(STANDARD.decode(input.trim()).map_err(|e| {
                BoxcryptError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::InvalidKeyEncoding,
                    "key is not valid base64",
                    e,
                )
            })?),
            KeyEncoding::Utf8 => Zeroizing::new(input.as_bytes().to_vec()),
        };
        Self::from_slice(&decoded)
    }

    /// Wraps raw bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidKeyLength,
                format!(
                    "key must be {} bytes ({} bits), got {} bytes",
                    KEY_LEN,
                    KEY_LEN * 8,
                    bytes.len()
                ),
            ));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Generates a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self { bytes: key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Base64 rendering, suitable for `resolve(_, KeyEncoding::Base64)`.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.bytes[..]))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}
