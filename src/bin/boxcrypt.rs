//! Boxcrypt CLI - batch file encryption
//!
//! Encrypts or decrypts a single file or every file directly inside a
//! directory with NaCl secretbox (XSalsa20Poly1305) and a raw 256-bit key.

use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use boxcrypt::config::{self, Config};
use boxcrypt::engine::{self, Request};
use boxcrypt::key_input::{ConstantKeyReader, KeyReader, ReaderKeyReader, TerminalKeyReader};
use boxcrypt::{
    BatchReport, BoxcryptError, EncodingMode, KeyEncoding, KeyMaterial, Mode, OperationResult,
};

#[derive(Parser)]
#[command(name = "boxcrypt")]
#[command(version)]
#[command(about = "Batch file encryption with a raw 256-bit key.", long_about = None)]
struct Cli {
    /// Read the key from stdin instead of from the terminal
    #[arg(long, global = true)]
    key_stdin: bool,

    /// Log level (off, error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, value_name = "LEVEL", value_parser = parse_level)]
    verbosity: Option<LevelFilter>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file, or every file in a directory
    #[command(alias = "e")]
    Encrypt(BatchArgs),

    /// Decrypt a file, or every file in a directory
    #[command(alias = "d")]
    Decrypt {
        #[command(flatten)]
        batch: BatchArgs,

        /// Write decrypted content to stdout instead of to files
        #[arg(short, long)]
        console_only: bool,
    },

    /// Print a fresh random key, base64 encoded
    #[command(alias = "g")]
    Generate,
}

#[derive(Args)]
struct BatchArgs {
    /// File or directory to process
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Output file or directory; defaults to alongside the source
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Key string; prefer BOXCRYPT_KEY or --key-stdin to keep it out of shell history
    #[arg(short, long, value_name = "KEY")]
    key: Option<String>,

    /// How the key string is encoded (base64 or utf8)
    #[arg(long, value_name = "ENCODING")]
    key_encoding: Option<KeyEncoding>,

    /// Ciphertext is base64 text rather than raw bytes
    #[arg(short = 't', long)]
    base64: bool,

    /// Replace existing output files
    #[arg(short, long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    init_logging(cli.verbosity.unwrap_or(config.verbosity));

    let result = match cli.command {
        Commands::Encrypt(batch) => run_batch(batch, Mode::Encrypt, false, cli.key_stdin, &config),
        Commands::Decrypt { batch, console_only } => {
            run_batch(batch, Mode::Decrypt, console_only, cli.key_stdin, &config)
        }
        Commands::Generate => generate(),
    };

    if let Err(e) = result {
        fail(&e);
    }
}

fn fail(e: &BoxcryptError) -> ! {
    eprintln!("Error: {}", e.chain_message());
    process::exit(1);
}

fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    config::parse_verbosity(s).map_err(|e| e.chain_message())
}

fn run_batch(
    args: BatchArgs,
    mode: Mode,
    console_only: bool,
    key_stdin: bool,
    config: &Config,
) -> boxcrypt::Result<()> {
    let mut reader = get_key_reader(args.key, key_stdin, config);
    let key_input = reader.read_key()?;

    let request = Request {
        source: args.source,
        target: args.output,
        key_input,
        key_encoding: args.key_encoding.unwrap_or(config.key_encoding),
        mode,
        content_encoding: if args.base64 {
            EncodingMode::Base64Text
        } else {
            EncodingMode::Binary
        },
        force_overwrite: args.force,
        naming: config.naming.clone(),
        cancel: Default::default(),
    };

    let report = if console_only {
        let mut out = io::stdout().lock();
        engine::execute_to_writer(&request, &mut out, |_| {})?
    } else {
        engine::execute(&request, print_written)?
    };
    summarize(&report);
    Ok(())
}

fn print_written(result: &OperationResult) {
    if result.success() {
        println!("Wrote {} bytes to {}.", result.payload_len(), result.output.display());
    }
}

fn summarize(report: &BatchReport) {
    info!(
        written = report.succeeded(),
        skipped = report.skipped(),
        "{} of {} file(s) processed",
        report.succeeded(),
        report.results.len()
    );
}

fn generate() -> boxcrypt::Result<()> {
    let key = KeyMaterial::generate();
    let encoded = key.to_base64();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", encoded.as_str()).map_err(|e| {
        BoxcryptError::with_kind_and_source(
            boxcrypt::ErrorCategory::Internal,
            boxcrypt::ErrorKind::Io,
            "failed to write key to stdout",
            e,
        )
    })
}

fn get_key_reader(key: Option<String>, use_stdin: bool, config: &Config) -> Box<dyn KeyReader> {
    if let Some(key) = key {
        Box::new(ConstantKeyReader::new(key))
    } else if use_stdin {
        Box::new(ReaderKeyReader::new(Box::new(io::stdin())))
    } else if let Some(key) = &config.key {
        Box::new(ConstantKeyReader::new(key.as_str()))
    } else {
        Box::new(TerminalKeyReader::new())
    }
}
