//! Single-file operations
//!
//! Reading inputs, running them through a [`Cipher`], and writing outputs
//! atomically. The batch engine is built on these; they are also the
//! convenient entry point for callers that handle one file at a time.

use crate::armor;
use crate::batch::EncodingMode;
use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use crate::secretcrypt::Cipher;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Encrypts the file at `path` and returns the raw blob.
pub fn encrypt_file_bytes(path: &Path, cipher: &dyn Cipher) -> Result<Vec<u8>> {
    let plaintext = read_file(path)?;
    let blob = cipher
        .seal(&plaintext)
        .map_err(|e| e.with_context(format!("failed to encrypt {}", path.display())))?;
    Ok(blob.into_bytes())
}

/// Encrypts the file at `path` and returns the blob as base64 text.
pub fn encrypt_file_base64(path: &Path, cipher: &dyn Cipher) -> Result<String> {
    let plaintext = read_file(path)?;
    let blob = cipher
        .seal(&plaintext)
        .map_err(|e| e.with_context(format!("failed to encrypt {}", path.display())))?;
    Ok(blob.to_base64())
}

/// Decrypts the file at `path`, read either as a raw blob or as base64 text.
pub fn decrypt_file_bytes(
    path: &Path,
    cipher: &dyn Cipher,
    encoding: EncodingMode,
) -> Result<Vec<u8>> {
    let blob = read_ciphertext(path, encoding)?;
    cipher
        .open(&blob)
        .map_err(|e| e.with_context(format!("failed to decrypt {}", path.display())))
}

/// Like [`decrypt_file_bytes`], returning text. A leading byte-order mark
/// or zero-width space is dropped.
pub fn decrypt_file_string(
    path: &Path,
    cipher: &dyn Cipher,
    encoding: EncodingMode,
) -> Result<String> {
    let plaintext = decrypt_file_bytes(path, cipher, encoding)?;
    let text = String::from_utf8(plaintext).map_err(|e| {
        BoxcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidUtf8,
            format!("decrypted content of {} is not valid UTF-8", path.display()),
            e,
        )
    })?;
    Ok(text.trim_start_matches(['\u{FEFF}', '\u{200B}']).to_string())
}

/// Reads the input of a decryption, undoing the base64 layer if present.
pub(crate) fn read_ciphertext(path: &Path, encoding: EncodingMode) -> Result<Vec<u8>> {
    let raw = read_file(path)?;
    match encoding {
        EncodingMode::Binary => Ok(raw),
        EncodingMode::Base64Text => armor::unwrap_bytes(&raw)
            .map_err(|e| e.with_context(format!("failed to decode {}", path.display()))),
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| read_error(path, e))
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory (write, flush, fsync, rename), so a failed write never leaves
/// a partial file under the final name.
///
/// With `overwrite` false the rename refuses to replace an existing file
/// and fails with [`io::ErrorKind::AlreadyExists`]. On Unix the file ends
/// up with mode 0o600.
pub fn write_atomic(path: &Path, contents: &[u8], overwrite: bool) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".boxcrypt-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp_file.write_all(contents)?;
    // Flush and fsync() such that the rename, if it succeeds, always
    // points to a complete file.
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file.as_file().metadata()?.permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms)?;
    }

    if overwrite {
        temp_file.persist(path).map_err(|e| e.error)?;
    } else {
        temp_file.persist_noclobber(path).map_err(|e| e.error)?;
    }
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> BoxcryptError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    BoxcryptError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
