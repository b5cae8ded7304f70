//! Boxcrypt - batch file and directory encryption using NaCl secretbox
//! with a raw 256-bit key

#![forbid(unsafe_code)]

pub mod armor;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod key;
pub mod key_input;
pub mod paths;
pub mod secretcrypt;

pub use batch::{
    BatchOptions, BatchProcessor, BatchReport, CancelToken, EncodingMode, OperationResult, Outcome,
    SkipReason,
};
pub use engine::Request;
pub use error::{BoxcryptError, ErrorCategory, ErrorKind, Result};
pub use key::{KeyEncoding, KeyMaterial};
pub use paths::{Mode, NamingPolicy, PathMapper, PathPair};
pub use secretcrypt::{Cipher, SecretboxCipher};
