//! Sources for the key string

use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::{Zeroize, Zeroizing};

/// Upper bound on a key read from a stream, trailing newline included.
pub const MAX_KEY_INPUT: usize = 4096;

/// Trait for obtaining the key string from various sources.
///
/// The returned string is what [`crate::key::KeyMaterial::resolve`]
/// consumes; it is not yet validated.
pub trait KeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<String>>;
}

/// Returns a fixed key string (command line, configuration, tests).
pub struct ConstantKeyReader {
    key: Zeroizing<String>,
}

impl ConstantKeyReader {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Zeroizing::new(key.into()),
        }
    }
}

impl KeyReader for ConstantKeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.key.clone())
    }
}

/// Reads the key string from any io::Read source, e.g. stdin.
///
/// One trailing line ending is stripped so that `echo key | boxcrypt ...`
/// works for both key encodings.
pub struct ReaderKeyReader {
    reader: Box<dyn Read>,
}

impl ReaderKeyReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl KeyReader for ReaderKeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<String>> {
        // The buffer never grows past its initial capacity, so no
        // unwiped copy is left behind by a reallocation.
        let mut raw = Zeroizing::new(Vec::with_capacity(MAX_KEY_INPUT + 1));
        (&mut self.reader)
            .take(MAX_KEY_INPUT as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| {
                BoxcryptError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::KeyUnavailable,
                    "error reading key",
                    e,
                )
            })?;
        if raw.len() > MAX_KEY_INPUT {
            return Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyUnavailable,
                format!("key input exceeds {} bytes", MAX_KEY_INPUT),
            ));
        }

        let mut data = match String::from_utf8(std::mem::take(&mut *raw)) {
            Ok(text) => Zeroizing::new(text),
            Err(e) => {
                e.into_bytes().zeroize();
                return Err(BoxcryptError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::KeyUnavailable,
                    "error reading key (must be UTF-8)",
                ));
            }
        };
        let trimmed_len = strip_line_ending(&data).len();
        data.truncate(trimmed_len);
        Ok(data)
    }
}

fn strip_line_ending(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

/// Reads the key from the terminal with no echo.
pub struct TerminalKeyReader;

impl TerminalKeyReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalKeyReader {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyReader for TerminalKeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyUnavailable,
                "no key given and stdin is not a terminal; use --key, --key-stdin or BOXCRYPT_KEY",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Key (boxcrypt): ")
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                BoxcryptError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to write prompt",
                    e,
                )
            })?;

        let key = rpassword::read_password().map_err(|e| {
            BoxcryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyUnavailable,
                "failure reading key",
                e,
            )
        })?;

        Ok(Zeroizing::new(key))
    }
}
