//! Sequential batch processing of path pairs
//!
//! Each pair is read, transformed and written before the next one starts.
//! Expected per-file conditions (authentication failure, bad base64, an
//! existing target) are recorded in the pair's [`OperationResult`] and the
//! batch moves on; nothing here aborts the remaining pairs.

use crate::error::{BoxcryptError, ErrorKind};
use crate::file_ops;
use crate::paths::{Mode, PathPair};
use crate::secretcrypt::Cipher;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Whether ciphertext is stored as raw bytes or as base64 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingMode {
    #[default]
    Binary,
    Base64Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub mode: Mode,
    pub encoding: EncodingMode,
    pub force_overwrite: bool,
}

impl BatchOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            encoding: EncodingMode::Binary,
            force_overwrite: false,
        }
    }
}

/// Why a pair produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Authentication failed or the blob was malformed.
    CipherFailure,
    /// The input of a base64 decryption was not valid base64 text.
    MalformedBase64Input,
    /// The output exists and overwriting was not forced.
    TargetExists,
    /// Reading the input, creating the directory or writing the output failed.
    Io,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::CipherFailure => "authentication failed or ciphertext is malformed",
            SkipReason::MalformedBase64Input => "input is not valid base64 text",
            SkipReason::TargetExists => "target already exists (use --force to overwrite)",
            SkipReason::Io => "I/O error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `bytes` is the length of the payload written: base64 characters for
    /// text output, raw bytes otherwise.
    Written { bytes: usize },
    Skipped(SkipReason),
}

/// Per-pair record; reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: Outcome,
    /// Underlying error message for skips, when there is one.
    pub detail: Option<String>,
}

impl OperationResult {
    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Written { .. })
    }

    pub fn payload_len(&self) -> usize {
        match self.outcome {
            Outcome::Written { bytes } => bytes,
            Outcome::Skipped(_) => 0,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.outcome {
            Outcome::Written { .. } => None,
            Outcome::Skipped(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<OperationResult>,
    /// The run stopped early because cancellation was requested.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

enum Sink<'w> {
    Files,
    Writer(&'w mut dyn Write),
}

/// Drives a [`Cipher`] over a sequence of [`PathPair`]s.
pub struct BatchProcessor<'c> {
    cipher: &'c dyn Cipher,
    options: BatchOptions,
    cancel: CancelToken,
}

impl<'c> BatchProcessor<'c> {
    pub fn new(cipher: &'c dyn Cipher, options: BatchOptions) -> Self {
        Self {
            cipher,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Processes every pair, writing outputs to their target files.
    pub fn run(&self, pairs: &[PathPair]) -> BatchReport {
        self.run_with(pairs, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_result` after each pair.
    pub fn run_with(
        &self,
        pairs: &[PathPair],
        on_result: impl FnMut(&OperationResult),
    ) -> BatchReport {
        self.drive(pairs, Sink::Files, on_result)
    }

    /// Processes every pair, writing each payload to `out` instead of to the
    /// pair's output file. The overwrite policy does not apply.
    pub fn run_to_writer(
        &self,
        pairs: &[PathPair],
        out: &mut dyn Write,
        on_result: impl FnMut(&OperationResult),
    ) -> BatchReport {
        self.drive(pairs, Sink::Writer(out), on_result)
    }

    fn drive(
        &self,
        pairs: &[PathPair],
        mut sink: Sink<'_>,
        mut on_result: impl FnMut(&OperationResult),
    ) -> BatchReport {
        let started = Instant::now();
        debug!(
            pairs = pairs.len(),
            mode = ?self.options.mode,
            encoding = ?self.options.encoding,
            force = self.options.force_overwrite,
            "starting batch"
        );

        let mut results = Vec::with_capacity(pairs.len());
        let mut cancelled = false;
        for pair in pairs {
            if self.cancel.is_cancelled() {
                warn!(remaining = pairs.len() - results.len(), "batch cancelled");
                cancelled = true;
                break;
            }

            let result = self.process(pair, &mut sink);
            match &result.outcome {
                Outcome::Written { bytes } => {
                    debug!(
                        input = %pair.input.display(),
                        output = %pair.output.display(),
                        bytes,
                        "processed"
                    );
                }
                Outcome::Skipped(reason) => {
                    warn!(
                        input = %pair.input.display(),
                        output = %pair.output.display(),
                        detail = result.detail.as_deref().unwrap_or(""),
                        "skipped: {}",
                        reason
                    );
                }
            }
            on_result(&result);
            results.push(result);
        }

        let elapsed = started.elapsed();
        info!("operation completed in {}ms", elapsed.as_millis());
        BatchReport {
            results,
            cancelled,
            elapsed,
        }
    }

    fn process(&self, pair: &PathPair, sink: &mut Sink<'_>) -> OperationResult {
        let outcome = self
            .transform(pair)
            .and_then(|payload| self.emit(pair, &payload, sink));
        let (outcome, detail) = match outcome {
            Ok(bytes) => (Outcome::Written { bytes }, None),
            Err((reason, detail)) => (Outcome::Skipped(reason), detail),
        };
        OperationResult {
            input: pair.input.clone(),
            output: pair.output.clone(),
            outcome,
            detail,
        }
    }

    /// Reads the input and runs the cipher, returning the bytes to emit.
    fn transform(&self, pair: &PathPair) -> Skippable<Vec<u8>> {
        match self.options.mode {
            Mode::Encrypt => {
                let plaintext = file_ops::read_file(&pair.input).map_err(skip_for)?;
                let blob = self.cipher.seal(&plaintext).map_err(skip_for)?;
                Ok(match self.options.encoding {
                    EncodingMode::Binary => blob.into_bytes(),
                    EncodingMode::Base64Text => blob.to_base64().into_bytes(),
                })
            }
            Mode::Decrypt => {
                let blob = file_ops::read_ciphertext(&pair.input, self.options.encoding)
                    .map_err(skip_for)?;
                self.cipher.open(&blob).map_err(skip_for)
            }
        }
    }

    fn emit(&self, pair: &PathPair, payload: &[u8], sink: &mut Sink<'_>) -> Skippable<usize> {
        match sink {
            Sink::Writer(out) => {
                out.write_all(payload)
                    .and_then(|()| out.flush())
                    .map_err(|e| (SkipReason::Io, Some(format!("failed to write output: {}", e))))?;
            }
            Sink::Files => {
                let force = self.options.force_overwrite;
                if !force && pair.output.exists() {
                    return Err((SkipReason::TargetExists, None));
                }
                file_ops::write_atomic(&pair.output, payload, force).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists && !force {
                        (SkipReason::TargetExists, None)
                    } else {
                        (
                            SkipReason::Io,
                            Some(format!("failed to write to {}: {}", pair.output.display(), e)),
                        )
                    }
                })?;
            }
        }
        Ok(payload.len())
    }
}

type Skippable<T> = std::result::Result<T, (SkipReason, Option<String>)>;

fn skip_for(err: BoxcryptError) -> (SkipReason, Option<String>) {
    let reason = match err.kind {
        Some(ErrorKind::MalformedBase64) => SkipReason::MalformedBase64Input,
        Some(ErrorKind::Io) => SkipReason::Io,
        _ => SkipReason::CipherFailure,
    };
    (reason, Some(err.chain_message()))
}
