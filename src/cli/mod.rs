//! CLI module for the forgec compiler driver
//!
//! `forgec [OPTIONS] [FILE]` compiles one source file into `<FILE stem>.<ext>` plus a
//! `<FILE stem>.runtimeconfig.json` sidecar.
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};

use crate::session::{OptimizationLevel, Platform, TargetKind};
use crate::version::FORGEC_VERSION;

use commands::{CompileRequest, MessageFormat};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// Missing or malformed command-line arguments
    pub const USAGE: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create a usage error (exit code 2).
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::USAGE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Compile a single source file into a binary and its runtime descriptor
#[derive(Parser, Debug)]
#[command(name = "forgec")]
#[command(version = FORGEC_VERSION)]
#[command(about = "Compile a single source file into a binary and its runtime descriptor", long_about = None)]
pub struct Cli {
    /// Source file to compile
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Configuration file (default: forgec.toml next to FILE, then in the current directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Additional reference to compile against (repeatable)
    #[arg(short = 'r', long = "reference", value_name = "NAME")]
    pub references: Vec<String>,

    /// Directory searched for references before the configured ones (repeatable)
    #[arg(long = "lib", value_name = "DIR")]
    pub lib_paths: Vec<PathBuf>,

    /// Output binary path (default: FILE with the binary extension)
    #[arg(short, long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub target: Option<TargetKind>,

    #[arg(long = "optimize", value_enum, value_name = "LEVEL")]
    pub optimization: Option<OptimizationLevel>,

    #[arg(long, value_enum)]
    pub platform: Option<Platform>,

    /// How compiler diagnostics are printed
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

impl Cli {
    /// Turn parsed arguments into a compile request; without a file this is a usage error.
    pub fn into_request(self) -> CliResult<CompileRequest> {
        let Some(source) = self.file else {
            return Err(CliError::usage(usage()));
        };
        Ok(CompileRequest {
            source,
            config: self.config,
            references: self.references,
            lib_paths: self.lib_paths,
            output: self.out,
            target: self.target,
            optimization: self.optimization,
            platform: self.platform,
            message_format: self.message_format,
        })
    }
}

/// Usage text printed when no source file is given.
fn usage() -> String {
    format!(
        "Please enter the path to the source code file.\n\n{}",
        Cli::command().render_usage()
    )
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                println!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    // Checked before any runtime or file access
    let request = cli.into_request()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("An error has occurred: cannot start runtime: {e}")))?;

    runtime.block_on(commands::compile_file(&request))
}

// ============================================================================
// Tests
// ============================================================================
