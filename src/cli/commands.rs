//! CLI command implementations
//!
//! `compile_file` returns `CliResult<ExitCode>` instead of calling `process::exit`. Error handling and exits happen
//! in the top-level `run()`.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::backend::{self, artifact::ArtifactWriter, artifact::RuntimeDescriptor};
use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::frontend::diagnostics::{self, Diagnostic};
use crate::frontend::source::{self, SourceUnit};
use crate::session::{CompilationSession, OptimizationLevel, Platform, TargetKind};

use super::{CliError, CliResult, ExitCode};

/// How compiler diagnostics are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// One `file(line,col): severity CODE: message` line per diagnostic
    Short,
    /// Diagnostic with the offending source line and a caret
    #[default]
    Human,
}

/// Everything the CLI collected for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileRequest {
    pub source: PathBuf,
    pub config: Option<PathBuf>,
    /// Appended to the configured reference names
    pub references: Vec<String>,
    /// Prepended to the configured search roots
    pub lib_paths: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub target: Option<TargetKind>,
    pub optimization: Option<OptimizationLevel>,
    pub platform: Option<Platform>,
    pub message_format: MessageFormat,
}

impl CompileRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Fold command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut DriverConfig) {
        config.references.names.extend(self.references.iter().cloned());
        if !self.lib_paths.is_empty() {
            let mut roots = self.lib_paths.clone();
            roots.append(&mut config.references.search_paths);
            config.references.search_paths = roots;
        }
        if let Some(target) = self.target {
            config.compilation.target = target;
        }
        if let Some(optimization) = self.optimization {
            config.compilation.optimization = optimization;
        }
        if let Some(platform) = self.platform {
            config.compilation.platform = platform;
        }
    }
}

/// Result of a build that did not fault.
#[derive(Debug)]
pub enum BuildOutcome {
    /// Binary and descriptor were written
    Written {
        output_path: PathBuf,
        descriptor_path: PathBuf,
        warnings: Vec<Diagnostic>,
    },
    /// The compiler reported errors; nothing was written
    Failed {
        diagnostics: Vec<Diagnostic>,
        source: SourceUnit,
    },
}

/// Assembly name for a source path: its file stem.
pub fn assembly_name(source_path: &Path) -> String {
    source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string())
}

/// Run the whole pipeline: load, resolve, compile, then write or report.
pub async fn build(request: &CompileRequest) -> DriverResult<BuildOutcome> {
    let mut config = DriverConfig::load(request.config.as_deref(), &request.source).await?;
    request.apply(&mut config);

    let source = source::load(&request.source, config.source.encoding).await?;

    let assembly_name = assembly_name(&request.source);
    let output_path = request
        .output
        .clone()
        .unwrap_or_else(|| request.source.with_extension(config.output_extension()));
    if same_file(&output_path, &request.source).await {
        return Err(DriverError::OutputIsSource { path: output_path });
    }

    let references = config.resolver().resolve(&config.references.names).await?;

    let mut session = CompilationSession::new(
        assembly_name.as_str(),
        source,
        references,
        backend::from_config(&config.compiler),
    )
    .with_options(config.compilation)
    .with_descriptor(RuntimeDescriptor::new(config.runtime.clone()));

    match session.compile().await? {
        Ok(artifact) => {
            let writer = ArtifactWriter::for_output(&output_path, &assembly_name);
            writer.write(&artifact).await?;
            Ok(BuildOutcome::Written {
                output_path,
                descriptor_path: writer.descriptor_path().to_path_buf(),
                warnings: artifact.diagnostics,
            })
        }
        Err(diagnostics) => Ok(BuildOutcome::Failed {
            diagnostics,
            source: session.source().clone(),
        }),
    }
}

/// Whether two paths name the same file. The source exists, so an output path that does not is never the source.
async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Compile a file and print exactly one of: a success line, a diagnostic listing, or a fault report.
pub async fn compile_file(request: &CompileRequest) -> CliResult<ExitCode> {
    match build(request).await {
        Ok(BuildOutcome::Written {
            output_path, warnings, ..
        }) => {
            let file = request.source.to_string_lossy();
            for line in diagnostics::format(&warnings, &file) {
                tracing::warn!("{}", line);
            }
            println!("Compilation successful! Output file: {}", output_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(BuildOutcome::Failed { diagnostics, source }) => {
            println!("Compilation error:");
            for block in report_lines(&diagnostics, &source, request.message_format) {
                println!("{}", block);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(CliError::failure(fault_message(err))),
    }
}

/// Diagnostic listing in the requested format.
pub fn report_lines(diagnostics: &[Diagnostic], source: &SourceUnit, format: MessageFormat) -> Vec<String> {
    let file = source.path().to_string_lossy();
    match format {
        MessageFormat::Short => diagnostics::format(diagnostics, &file),
        MessageFormat::Human => {
            let color = std::io::stdout().is_terminal();
            diagnostics
                .iter()
                .map(|d| diagnostics::render(d, source, &file, color))
                .collect()
        }
    }
}

/// A single fault line followed by the error report with its cause chain.
pub fn fault_message(err: DriverError) -> String {
    let headline = format!("An error has occurred: {err}");
    let report = miette::Report::new(err);
    format!("{headline}\n{report:?}")
}

// ============================================================================
// Tests
// ============================================================================
