//! One invocation of the batch engine: key, paths, then the batch.
//!
//! Everything that can be rejected up front (key encoding and length,
//! source and target kinds) is checked here before any file is read or
//! written.

use crate::batch::{
    BatchOptions, BatchProcessor, BatchReport, CancelToken, EncodingMode, OperationResult,
};
use crate::error::Result;
use crate::key::{KeyEncoding, KeyMaterial};
use crate::paths::{Mode, NamingPolicy, PathMapper, PathPair};
use crate::secretcrypt::SecretboxCipher;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct Request {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub key_input: Zeroizing<String>,
    pub key_encoding: KeyEncoding,
    pub mode: Mode,
    pub content_encoding: EncodingMode,
    pub force_overwrite: bool,
    pub naming: NamingPolicy,
    pub cancel: CancelToken,
}

impl Request {
    pub fn new(source: impl Into<PathBuf>, key_input: impl Into<String>, mode: Mode) -> Self {
        Self {
            source: source.into(),
            target: None,
            key_input: Zeroizing::new(key_input.into()),
            key_encoding: KeyEncoding::default(),
            mode,
            content_encoding: EncodingMode::default(),
            force_overwrite: false,
            naming: NamingPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            mode: self.mode,
            encoding: self.content_encoding,
            force_overwrite: self.force_overwrite,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("key_input", &"<redacted>")
            .field("key_encoding", &self.key_encoding)
            .field("mode", &self.mode)
            .field("content_encoding", &self.content_encoding)
            .field("force_overwrite", &self.force_overwrite)
            .finish_non_exhaustive()
    }
}

/// Runs the request, writing outputs to files.
pub fn execute(request: &Request, on_result: impl FnMut(&OperationResult)) -> Result<BatchReport> {
    let (cipher, pairs) = prepare(request)?;
    Ok(BatchProcessor::new(&cipher, request.options())
        .with_cancel_token(request.cancel.clone())
        .run_with(&pairs, on_result))
}

/// Runs the request, writing every payload to `out` instead of to files.
pub fn execute_to_writer(
    request: &Request,
    out: &mut dyn Write,
    on_result: impl FnMut(&OperationResult),
) -> Result<BatchReport> {
    let (cipher, pairs) = prepare(request)?;
    Ok(BatchProcessor::new(&cipher, request.options())
        .with_cancel_token(request.cancel.clone())
        .run_to_writer(&pairs, out, on_result))
}

fn prepare(request: &Request) -> Result<(SecretboxCipher, Vec<PathPair>)> {
    let key = KeyMaterial::resolve(&request.key_input, request.key_encoding)?;
    let cipher = SecretboxCipher::new(&key);
    drop(key);

    let mapper = PathMapper::new(request.naming.clone());
    let pairs = mapper.map(&request.source, request.target.as_deref(), request.mode)?;
    debug!(
        source = %request.source.display(),
        pairs = pairs.len(),
        "resolved path pairs"
    );
    Ok((cipher, pairs))
}
