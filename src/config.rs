//! Configuration: built-in defaults, an optional JSON file, then
//! environment variables. Command-line options are layered on top by the
//! binary.

use crate::error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
use crate::key::KeyEncoding;
use crate::paths::{DECRYPTED_MARKER, ENCRYPTED_SUFFIX, NamingPolicy};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use zeroize::Zeroizing;

/// Looked up in the working directory when `BOXCRYPT_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "boxcrypt.json";

pub const CONFIG_ENV: &str = "BOXCRYPT_CONFIG";
pub const KEY_ENV: &str = "BOXCRYPT_KEY";
pub const KEY_ENCODING_ENV: &str = "BOXCRYPT_KEY_ENCODING";
pub const VERBOSITY_ENV: &str = "BOXCRYPT_VERBOSITY";

/// Default log level when nothing else is configured.
pub const DEFAULT_VERBOSITY: LevelFilter = LevelFilter::WARN;

/// On-disk shape of the configuration file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    key: Option<String>,
    key_encoding: Option<String>,
    verbosity: Option<String>,
    encrypted_suffix: Option<String>,
    decrypted_marker: Option<String>,
}

/// Resolved settings.
#[derive(Clone)]
pub struct Config {
    /// Key string, if one was configured. Never logged.
    pub key: Option<Zeroizing<String>>,
    pub key_encoding: KeyEncoding,
    pub verbosity: LevelFilter,
    pub naming: NamingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: None,
            key_encoding: KeyEncoding::default(),
            verbosity: DEFAULT_VERBOSITY,
            naming: NamingPolicy::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("key_encoding", &self.key_encoding)
            .field("verbosity", &self.verbosity)
            .field("naming", &self.naming)
            .finish()
    }
}

impl Config {
    /// Loads from the process environment and working directory.
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok(), Path::new("."))
    }

    /// Loads using `env` for variable lookup and `dir` as the directory
    /// searched for [`CONFIG_FILE_NAME`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>, dir: &Path) -> Result<Self> {
        let file = match env(CONFIG_ENV) {
            Some(path) => read_file_config(&PathBuf::from(path), true)?,
            None => read_file_config(&dir.join(CONFIG_FILE_NAME), false)?,
        };
        Self::from_layers(file, env)
    }

    fn from_layers(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let key = env(KEY_ENV).or(file.key).map(Zeroizing::new);

        let key_encoding = match env(KEY_ENCODING_ENV).or(file.key_encoding) {
            Some(s) => s.parse()?,
            None => KeyEncoding::default(),
        };

        let verbosity = match env(VERBOSITY_ENV).or(file.verbosity) {
            Some(s) => parse_verbosity(&s)?,
            None => DEFAULT_VERBOSITY,
        };

        let naming = NamingPolicy::new(
            file.encrypted_suffix.as_deref().unwrap_or(ENCRYPTED_SUFFIX),
            file.decrypted_marker.as_deref().unwrap_or(DECRYPTED_MARKER),
        )?;

        Ok(Self {
            key,
            key_encoding,
            verbosity,
            naming,
        })
    }
}

/// Parses a verbosity name (`off`, `error`, `warn`, `info`, `debug`,
/// `trace`), case-insensitively.
pub fn parse_verbosity(s: &str) -> Result<LevelFilter> {
    s.trim().parse::<LevelFilter>().map_err(|e| {
        BoxcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Config,
            format!("invalid verbosity {s:?}"),
            e,
        )
    })
}

fn read_file_config(path: &Path, required: bool) -> Result<FileConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
            return Ok(FileConfig::default());
        }
        Err(e) => {
            return Err(BoxcryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("failed to read config file {}", path.display()),
                e,
            ));
        }
    };
    serde_json::from_str(&content).map_err(|e| {
        BoxcryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Config,
            format!("invalid config file {}", path.display()),
            e,
        )
    })
}
