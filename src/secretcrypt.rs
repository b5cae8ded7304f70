//! Authenticated encryption with a raw 256-bit key using NaCl secretbox
//! (XSalsa20Poly1305).
//!
//! The blob format is:
//! - nonce: 24 bytes
//! - sealed box: variable length (ciphertext followed by the 16-byte
//!   Poly1305 tag)
//!
//! The blob is self-contained; nothing besides the key is needed to open it.

use crate::armor;
use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use crate::key::KeyMaterial;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 tag in bytes
pub const TAG_LEN: usize = 16;

/// Output of a successful seal: the raw blob, with its base64 form on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    bytes: Vec<u8>,
}

impl SealedBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The blob as base64 text, as written for `EncodingMode::Base64Text`.
    pub fn to_base64(&self) -> String {
        armor::wrap(&self.bytes)
    }
}

/// The seam between the batch engine and the AEAD primitive.
///
/// `open` reports authentication failures and malformed blobs as errors
/// with kind [`ErrorKind::AuthenticationFailed`] or
/// [`ErrorKind::MalformedCiphertext`]; callers processing many files treat
/// those as per-file failures.
pub trait Cipher {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob>;
    fn open(&self, blob: &[u8]) -> Result<Vec<u8>>;
}

/// XSalsa20Poly1305 keyed once per invocation.
pub struct SecretboxCipher {
    cipher: XSalsa20Poly1305,
}

impl SecretboxCipher {
    pub fn new(key: &KeyMaterial) -> Self {
        Self {
            cipher: XSalsa20Poly1305::new(&(*key.as_bytes()).into()),
        }
    }

    /// Seal with a caller-provided nonce.
    ///
    /// This function is ONLY for testing purposes to generate deterministic
    /// output. Never reuse a nonce with the same key - use `seal()`, which
    /// draws a random nonce for every call.
    pub fn seal_with_nonce(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<SealedBlob> {
        let sealed_box = self
            .cipher
            .encrypt(&Nonce::from(*nonce), plaintext)
            .map_err(|e| {
                BoxcryptError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::SecretboxFailure,
                    format!("encryption failed: {}", e),
                )
            })?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + sealed_box.len());
        bytes.extend_from_slice(nonce);
        bytes.extend_from_slice(&sealed_box);
        Ok(SealedBlob { bytes })
    }
}

impl Cipher for SecretboxCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        self.seal_with_nonce(plaintext, &nonce)
    }

    fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedCiphertext,
                format!(
                    "input likely truncated: {} bytes, need at least {}",
                    blob.len(),
                    NONCE_LEN + TAG_LEN
                ),
            ));
        }

        let (nonce, sealed_box) = blob.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            BoxcryptError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::MalformedCiphertext,
                "failed to read nonce",
            )
        })?;

        self.cipher
            .decrypt(&Nonce::from(nonce), sealed_box)
            .map_err(|_| {
                BoxcryptError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::AuthenticationFailed,
                    "corrupt input, tampered-with data, or wrong key",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_LEN;

    fn cipher_with(byte: u8) -> SecretboxCipher {
        SecretboxCipher::new(&KeyMaterial::from_slice(&[byte; KEY_LEN]).unwrap())
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = cipher_with(1);
        let blob = cipher.seal(b"").unwrap();
        assert_eq!(blob.as_bytes().len(), NONCE_LEN + TAG_LEN);
        assert_eq!(cipher.open(blob.as_bytes()).unwrap(), b"");
    }

    #[test]
    fn test_small_plaintext() {
        let cipher = cipher_with(1);
        let blob = cipher.seal(b"hello").unwrap();
        assert_eq!(blob.as_bytes().len(), NONCE_LEN + 5 + TAG_LEN);
        assert_eq!(cipher.open(blob.as_bytes()).unwrap(), b"hello");
    }

    #[test]
    fn test_all_byte_values() {
        let cipher = cipher_with(7);
        let plaintext: Vec<u8> = (0..=255).collect();
        let blob = cipher.seal(&plaintext).unwrap();
        assert_eq!(cipher.open(blob.as_bytes()).unwrap(), plaintext);
    }

    #[test]
    fn test_large_plaintext() {
        let cipher = cipher_with(7);
        let plaintext = vec![0x42u8; 128 * 1024];
        let blob = cipher.seal(&plaintext).unwrap();
        assert_eq!(cipher.open(blob.as_bytes()).unwrap(), plaintext);
    }

    #[test]
    fn test_deterministic_nonce() {
        let cipher = cipher_with(1);
        let nonce = [2u8; NONCE_LEN];

        let b1 = cipher.seal_with_nonce(b"hello world", &nonce).unwrap();
        let b2 = cipher.seal_with_nonce(b"hello world", &nonce).unwrap();

        assert_eq!(b1, b2);
        assert_eq!(&b1.as_bytes()[..NONCE_LEN], &nonce);
        assert_eq!(cipher.open(b1.as_bytes()).unwrap(), b"hello world");
    }

    #[test]
    fn test_random_nonce_differs() {
        let cipher = cipher_with(1);
        let b1 = cipher.seal(b"same").unwrap();
        let b2 = cipher.seal(b"same").unwrap();
        assert_ne!(&b1.as_bytes()[..NONCE_LEN], &b2.as_bytes()[..NONCE_LEN]);
        assert_ne!(b1, b2);
    }

    #[test]
    fn test_wrong_key() {
        let blob = cipher_with(1).seal(b"secret data").unwrap();
        let err = cipher_with(2).open(blob.as_bytes()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let cipher = cipher_with(3);
        let blob = cipher.seal(b"tamper me").unwrap().into_bytes();

        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                let err = cipher
                    .open(&tampered)
                    .expect_err("tampered blob must not open");
                assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
            }
        }
    }

    #[test]
    fn test_truncated_blob() {
        let cipher = cipher_with(1);
        let err = cipher.open(&[0u8; NONCE_LEN + TAG_LEN - 1]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedCiphertext));

        let err = cipher.open(b"").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedCiphertext));
    }

    #[test]
    fn test_trailing_data_fails_authentication() {
        let cipher = cipher_with(1);
        let mut blob = cipher.seal(b"hello").unwrap().into_bytes();
        blob.push(0xFF);
        let err = cipher.open(&blob).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_base64_form_matches_bytes() {
        let cipher = cipher_with(1);
        let blob = cipher.seal(b"hello").unwrap();
        let decoded = armor::unwrap(&blob.to_base64()).unwrap();
        assert_eq!(decoded, blob.as_bytes());
    }
}
