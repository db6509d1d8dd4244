//! Driver error taxonomy
//!
//! Every fallible step of the pipeline returns [`DriverResult`]. Errors propagate with `?` up to the CLI
//! boundary, which is the only place that prints them.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::backend::BackendError;
use crate::frontend::diagnostics::{Diagnostic, Severity};
use crate::frontend::source::SourceEncoding;

/// Errors produced by the driver.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum DriverError {
    /// A file could not be read, written or inspected.
    #[error("cannot access '{}': {source}", .path.display())]
    #[diagnostic(code(forgec::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file is larger than the loader accepts.
    #[error("source file '{}' is too large ({size} bytes, max {max} bytes)", .path.display())]
    #[diagnostic(code(forgec::io::too_large))]
    SourceTooLarge { path: PathBuf, size: u64, max: u64 },

    /// The output path names the source file itself.
    #[error("output '{}' would overwrite the source file", .path.display())]
    #[diagnostic(code(forgec::output_is_source), help("pass a different output path with --out"))]
    OutputIsSource { path: PathBuf },

    /// Source bytes are not valid text under the declared encoding.
    #[error("'{}' is not valid {encoding} text (invalid sequence at byte {offset})", .path.display())]
    #[diagnostic(code(forgec::encoding), help("save the file as UTF-8 or set `source.encoding` in forgec.toml"))]
    Encoding {
        path: PathBuf,
        encoding: SourceEncoding,
        offset: usize,
    },

    /// A reference name could not be resolved in any search root.
    #[error("reference '{name}' could not be resolved")]
    #[diagnostic(code(forgec::missing_reference), help("add its directory with --lib or `references.search_paths`"))]
    MissingReference { name: String },

    /// Two references resolved to the same name.
    #[error("reference '{name}' is listed more than once")]
    #[diagnostic(code(forgec::duplicate_reference))]
    DuplicateReference { name: String },

    /// The backend reported at least one error-severity diagnostic.
    #[error("compilation failed with {} error(s)", error_count(.diagnostics))]
    #[diagnostic(code(forgec::compilation))]
    Compilation { diagnostics: Vec<Diagnostic> },

    /// The configuration file is malformed.
    #[error("invalid configuration in '{}': {message}", .path.display())]
    #[diagnostic(code(forgec::config))]
    Config { path: PathBuf, message: String },

    /// The compiler backend failed in a way that is not a diagnostic.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_counts_only_errors() {
        let err = DriverError::Compilation {
            diagnostics: vec![
                Diagnostic::error("FG1001", "'}' expected", None),
                Diagnostic::warning("FG2001", "source file is empty", None),
                Diagnostic::error("FG1002", "unexpected ')'", None),
            ],
        };
        assert_eq!(err.to_string(), "compilation failed with 2 error(s)");
    }

    #[test]
    fn test_io_error_names_path() {
        let err = DriverError::io(
            "missing.cs",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().starts_with("cannot access 'missing.cs'"));
    }

    #[test]
    fn test_miette_codes_are_stable() {
        let err = DriverError::MissingReference {
            name: "System.Runtime".to_string(),
        };
        let code = MietteDiagnostic::code(&err).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("forgec::missing_reference"));
    }
}
