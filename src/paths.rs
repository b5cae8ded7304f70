//! Mapping a source path and an optional target onto (input, output) pairs
//!
//! Naming rules:
//! - encrypting appends the encrypted suffix to the whole file name
//!   (`report.txt` -> `report.txt.enc`);
//! - decrypting strips that suffix when present, otherwise inserts the
//!   decrypted marker before the extension (`report.txt` ->
//!   `report-decrypted.txt`) so the original is never silently replaced.

use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to encrypted file names.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Marker inserted before the extension of decrypted files whose name does
/// not carry the encrypted suffix.
pub const DECRYPTED_MARKER: &str = "-decrypted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// One unit of work: a source file and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl PathPair {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// What a source path turned out to be, decided once up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A regular file, or a path that does not exist.
    File { exists: bool },
    /// A directory, or a missing path spelled with a trailing separator.
    Directory { exists: bool },
    /// Anything else (sockets, devices, fifos).
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

/// The encrypted suffix and decrypted marker, shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    encrypted_suffix: String,
    decrypted_marker: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            encrypted_suffix: ENCRYPTED_SUFFIX.to_string(),
            decrypted_marker: DECRYPTED_MARKER.to_string(),
        }
    }
}

impl NamingPolicy {
    pub fn new(
        encrypted_suffix: impl Into<String>,
        decrypted_marker: impl Into<String>,
    ) -> Result<Self> {
        let encrypted_suffix = encrypted_suffix.into();
        let decrypted_marker = decrypted_marker.into();
        for (what, value) in [
            ("encrypted suffix", &encrypted_suffix),
            ("decrypted marker", &decrypted_marker),
        ] {
            if value.is_empty() || value.chars().any(std::path::is_separator) {
                return Err(BoxcryptError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::Config,
                    format!(
                        "{what} must be non-empty and contain no path separators, got {value:?}"
                    ),
                ));
            }
        }
        Ok(Self {
            encrypted_suffix,
            decrypted_marker,
        })
    }

    pub fn encrypted_suffix(&self) -> &str {
        &self.encrypted_suffix
    }

    pub fn decrypted_marker(&self) -> &str {
        &self.decrypted_marker
    }

    /// Whether `name` already carries the encrypted suffix (exact match).
    pub fn is_encrypted_name(&self, name: &OsStr) -> bool {
        strip_suffix(name, &self.encrypted_suffix).is_some()
    }

    pub fn encrypted_name(&self, name: &OsStr) -> OsString {
        let mut out = name.to_os_string();
        out.push(&self.encrypted_suffix);
        out
    }

    pub fn decrypted_name(&self, name: &OsStr) -> OsString {
        let stripped = strip_suffix(name, &self.encrypted_suffix);
        if let Some(stripped) = stripped.filter(|s| !s.is_empty()) {
            return stripped.to_os_string();
        }

        let as_path = Path::new(name);
        let mut out = as_path
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| name.to_os_string());
        out.push(&self.decrypted_marker);
        if let Some(ext) = as_path.extension() {
            out.push(".");
            out.push(ext);
        }
        out
    }

    pub fn output_name(&self, name: &OsStr, mode: Mode) -> OsString {
        match mode {
            Mode::Encrypt => self.encrypted_name(name),
            Mode::Decrypt => self.decrypted_name(name),
        }
    }
}

/// Resolves sources and targets into [`PathPair`]s.
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    naming: NamingPolicy,
}

impl PathMapper {
    pub fn new(naming: NamingPolicy) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    /// Produces the ordered pairs for `source` and an optional `target`.
    ///
    /// Missing sources yield no pairs. Nothing is created on disk.
    pub fn map(&self, source: &Path, target: Option<&Path>, mode: Mode) -> Result<Vec<PathPair>> {
        let source_kind = source_kind(source)?;
        let target_kind = match target {
            Some(t) => Some(target_kind(t, source_kind)?),
            None => None,
        };

        match source_kind {
            SourceKind::Directory { exists } => {
                let target_dir = match (target, target_kind) {
                    (None, _) => source,
                    (Some(t), Some(TargetKind::Directory)) => t,
                    (Some(t), _) => {
                        return Err(BoxcryptError::with_kind(
                            ErrorCategory::User,
                            ErrorKind::InvalidTargetKind,
                            format!(
                                "target {} must be a directory when source {} is a directory",
                                t.display(),
                                source.display()
                            ),
                        ));
                    }
                };
                if !exists {
                    debug!(source = %source.display(), "source directory does not exist");
                    return Ok(Vec::new());
                }
                self.map_directory(source, target_dir, mode)
            }
            SourceKind::File { exists } => {
                let name = source.file_name().ok_or_else(|| {
                    BoxcryptError::with_kind(
                        ErrorCategory::User,
                        ErrorKind::InvalidSourceKind,
                        format!("source {} does not name a file", source.display()),
                    )
                })?;
                if !exists {
                    debug!(source = %source.display(), "source file does not exist");
                    return Ok(Vec::new());
                }
                let output = match (target, target_kind) {
                    (Some(t), Some(TargetKind::File)) => t.to_path_buf(),
                    (Some(t), _) => t.join(self.naming.output_name(name, mode)),
                    (None, _) => source.with_file_name(self.naming.output_name(name, mode)),
                };
                Ok(vec![PathPair::new(source, output)])
            }
            SourceKind::Other => Err(BoxcryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidSourceKind,
                format!(
                    "source {} is neither a regular file nor a directory",
                    source.display()
                ),
            )),
        }
    }

    fn map_directory(&self, source: &Path, target_dir: &Path, mode: Mode) -> Result<Vec<PathPair>> {
        let mut files = Vec::new();
        let entries = fs::read_dir(source).map_err(|e| io_error(source, "failed to list", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(source, "failed to list", e))?;
            let path = entry.path();
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => files.push(entry.file_name()),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable entry"),
            }
        }
        files.sort();

        let pairs = files
            .into_iter()
            .filter(|name| {
                let skip = mode == Mode::Encrypt && self.naming.is_encrypted_name(name);
                if skip {
                    debug!(file = ?name, "skipping already encrypted file");
                }
                !skip
            })
            .map(|name| {
                let output = target_dir.join(self.naming.output_name(&name, mode));
                PathPair::new(source.join(&name), output)
            })
            .collect();
        Ok(pairs)
    }
}

/// Classifies `path` as a source.
pub fn source_kind(path: &Path) -> Result<SourceKind> {
    Ok(match probe(path)? {
        Some(meta) if meta.is_dir() => SourceKind::Directory { exists: true },
        Some(meta) if meta.is_file() => SourceKind::File { exists: true },
        Some(_) => SourceKind::Other,
        None if has_trailing_separator(path) => SourceKind::Directory { exists: false },
        None => SourceKind::File { exists: false },
    })
}

/// Classifies `path` as a target for the given source.
pub fn target_kind(path: &Path, source: SourceKind) -> Result<TargetKind> {
    match probe(path)? {
        Some(meta) if meta.is_dir() => Ok(TargetKind::Directory),
        Some(meta) if meta.is_file() => Ok(TargetKind::File),
        Some(_) => Err(BoxcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidTargetKind,
            format!(
                "target {} is neither a regular file nor a directory",
                path.display()
            ),
        )),
        None if has_trailing_separator(path) => Ok(TargetKind::Directory),
        None if matches!(source, SourceKind::Directory { .. }) => Ok(TargetKind::Directory),
        None => Ok(TargetKind::File),
    }
}

/// Strips `suffix` from the raw bytes of `name`, so names that are not
/// valid UTF-8 are treated the same in both directions.
#[cfg(unix)]
fn strip_suffix<'a>(name: &'a OsStr, suffix: &str) -> Option<&'a OsStr> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes()
        .strip_suffix(suffix.as_bytes())
        .map(OsStr::from_bytes)
}

#[cfg(not(unix))]
fn strip_suffix<'a>(name: &'a OsStr, suffix: &str) -> Option<&'a OsStr> {
    name.to_str()
        .and_then(|s| s.strip_suffix(suffix))
        .map(OsStr::new)
}

fn probe(path: &Path) -> Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, "failed to inspect", e)),
    }
}

fn has_trailing_separator(path: &Path) -> bool {
    path.as_os_str()
        .as_encoded_bytes()
        .last()
        .is_some_and(|&b| std::path::is_separator(b as char))
}

fn io_error(path: &Path, what: &str, err: io::Error) -> BoxcryptError {
    BoxcryptError::with_kind_and_source(
        ErrorCategory::User,
        ErrorKind::Io,
        format!("{} {}", what, path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(pairs: &[PathPair]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|p| {
                (
                    p.input.file_name().unwrap().to_string_lossy().into_owned(),
                    p.output.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    #[test]
    fn test_encrypted_name_appends_suffix() {
        let naming = NamingPolicy::default();
        assert_eq!(naming.encrypted_name(OsStr::new("report.txt")), "report.txt.enc");
        assert_eq!(naming.encrypted_name(OsStr::new("README")), "README.enc");
    }

    #[test]
    fn test_decrypted_name_strips_suffix() {
        let naming = NamingPolicy::default();
        assert_eq!(naming.decrypted_name(OsStr::new("report.txt.enc")), "report.txt");
        assert_eq!(naming.decrypted_name(OsStr::new("a.enc.enc")), "a.enc");
    }

    #[test]
    fn test_decrypted_name_inserts_marker() {
        let naming = NamingPolicy::default();
        assert_eq!(naming.decrypted_name(OsStr::new("report.txt")), "report-decrypted.txt");
        assert_eq!(naming.decrypted_name(OsStr::new("a.tar.gz")), "a.tar-decrypted.gz");
        assert_eq!(naming.decrypted_name(OsStr::new("README")), "README-decrypted");
        assert_eq!(naming.decrypted_name(OsStr::new(".bashrc")), ".bashrc-decrypted");
        // Suffix match is exact
        assert_eq!(naming.decrypted_name(OsStr::new("photo.ENC")), "photo-decrypted.ENC");
        // A bare suffix would strip to nothing
        assert_eq!(naming.decrypted_name(OsStr::new(".enc")), ".enc-decrypted");
    }

    #[test]
    fn test_naming_roundtrip() {
        let naming = NamingPolicy::default();
        for name in ["a.txt", "archive.tar.gz", "noext", ".hidden"] {
            let encrypted = naming.encrypted_name(OsStr::new(name));
            assert_eq!(naming.decrypted_name(&encrypted), name);
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_naming_roundtrip_non_utf8() {
        use std::os::unix::ffi::OsStrExt;

        let naming = NamingPolicy::default();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        let encrypted = naming.encrypted_name(name);
        assert_eq!(encrypted.as_bytes(), b"caf\xe9.txt.enc");
        assert!(naming.is_encrypted_name(&encrypted));
        assert!(!naming.is_encrypted_name(name));
        assert_eq!(naming.decrypted_name(&encrypted), name);
        assert_eq!(naming.decrypted_name(name).as_bytes(), b"caf\xe9-decrypted.txt");
    }

    #[test]
    fn test_custom_naming() {
        let naming = NamingPolicy::new(".aes", "-plain").unwrap();
        assert_eq!(naming.encrypted_name(OsStr::new("x.txt")), "x.txt.aes");
        assert_eq!(naming.decrypted_name(OsStr::new("x.txt.aes")), "x.txt");
        assert_eq!(naming.decrypted_name(OsStr::new("x.txt")), "x-plain.txt");
    }

    #[test]
    fn test_invalid_naming_rejected() {
        assert!(NamingPolicy::new("", "-d").is_err());
        assert!(NamingPolicy::new(".enc", "").is_err());
        let err = NamingPolicy::new("/enc", "-d").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_file_without_target_maps_next_to_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"x").unwrap();

        let mapper = PathMapper::default();
        let pairs = mapper.map(&source, None, Mode::Encrypt).unwrap();
        assert_eq!(pairs, vec![PathPair::new(&source, dir.path().join("a.txt.enc"))]);

        let pairs = mapper.map(&source, None, Mode::Decrypt).unwrap();
        assert_eq!(pairs, vec![PathPair::new(&source, dir.path().join("a-decrypted.txt"))]);
    }

    #[test]
    fn test_file_into_directory_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt.enc");
        let out = dir.path().join("out");
        fs::write(&source, b"x").unwrap();
        fs::create_dir(&out).unwrap();

        let pairs = PathMapper::default().map(&source, Some(&out), Mode::Decrypt).unwrap();
        assert_eq!(pairs, vec![PathPair::new(&source, out.join("a.txt"))]);
    }

    #[test]
    fn test_file_into_missing_directory_with_trailing_separator() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"x").unwrap();
        let target = PathBuf::from(format!("{}/", dir.path().join("new").display()));

        let pairs = PathMapper::default().map(&source, Some(&target), Mode::Encrypt).unwrap();
        assert_eq!(pairs[0].output, dir.path().join("new").join("a.txt.enc"));
    }

    #[test]
    fn test_file_to_explicit_file_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        let target = dir.path().join("custom.bin");
        fs::write(&source, b"x").unwrap();

        let pairs = PathMapper::default().map(&source, Some(&target), Mode::Encrypt).unwrap();
        assert_eq!(pairs, vec![PathPair::new(&source, &target)]);
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("nope.txt");
        let pairs = PathMapper::default().map(&source, None, Mode::Encrypt).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_missing_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let source = PathBuf::from(format!("{}/", dir.path().join("nope").display()));
        assert_eq!(
            source_kind(&source).unwrap(),
            SourceKind::Directory { exists: false }
        );
        let pairs = PathMapper::default().map(&source, None, Mode::Decrypt).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_directory_encrypt_in_place_skips_encrypted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("c.txt.enc"), b"c").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.txt"), b"d").unwrap();

        let pairs = PathMapper::default().map(dir.path(), None, Mode::Encrypt).unwrap();
        assert_eq!(
            names(&pairs),
            vec![
                ("a.txt".to_string(), "a.txt.enc".to_string()),
                ("b.txt".to_string(), "b.txt.enc".to_string()),
            ]
        );
        assert!(pairs.iter().all(|p| p.output.parent() == Some(dir.path())));
    }

    #[test]
    fn test_directory_decrypt_into_target() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("decrypted");
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt.enc"), b"a").unwrap();
        fs::write(src.join("notes.md"), b"n").unwrap();

        // Target does not exist yet; a directory source makes it a directory.
        let pairs = PathMapper::default().map(&src, Some(&out), Mode::Decrypt).unwrap();
        assert_eq!(
            names(&pairs),
            vec![
                ("a.txt.enc".to_string(), "a.txt".to_string()),
                ("notes.md".to_string(), "notes-decrypted.md".to_string()),
            ]
        );
        assert!(pairs.iter().all(|p| p.output.parent() == Some(out.as_path())));
        assert!(!out.exists(), "mapping must not create directories");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_directory_in_place_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let plain = OsStr::from_bytes(b"\xff\xfe.bin");
        let sealed = OsStr::from_bytes(b"\xff\xfe.bin.enc");
        fs::write(dir.path().join(plain), b"p").unwrap();
        fs::write(dir.path().join(sealed), b"s").unwrap();

        let mapper = PathMapper::default();
        let pairs = mapper.map(dir.path(), None, Mode::Encrypt).unwrap();
        assert_eq!(
            pairs,
            vec![PathPair::new(dir.path().join(plain), dir.path().join(sealed))]
        );

        let pairs = mapper.map(dir.path(), None, Mode::Decrypt).unwrap();
        assert_eq!(
            pairs,
            vec![
                PathPair::new(
                    dir.path().join(plain),
                    dir.path().join(OsStr::from_bytes(b"\xff\xfe-decrypted.bin")),
                ),
                PathPair::new(dir.path().join(sealed), dir.path().join(plain)),
            ]
        );
    }

    #[test]
    fn test_directory_with_file_target_fails() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.txt");
        fs::write(&target, b"x").unwrap();

        let err = PathMapper::default()
            .map(dir.path(), Some(&target), Mode::Encrypt)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidTargetKind));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let pairs = PathMapper::default().map(dir.path(), None, Mode::Encrypt).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_special_file_source_fails() {
        let err = PathMapper::default()
            .map(Path::new("/dev/null"), None, Mode::Encrypt)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidSourceKind));
    }

    #[test]
    #[cfg(unix)]
    fn test_special_file_target_fails() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"x").unwrap();
        let err = PathMapper::default()
            .map(&source, Some(Path::new("/dev/null")), Mode::Encrypt)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidTargetKind));
    }
}
