//! forgec compiler backends
//!
//! The driver never compiles anything itself. It hands a [`CompileInput`] to a [`Compiler`] and gets back an
//! optional binary plus diagnostics.
//!
//! ## Module Organization
//!
//! - `builtin.rs` - In-process structural checker and deterministic image packager
//! - `external.rs` - Delegation to a compiler executable (e.g. `csc`) with a deadline
//! - `artifact.rs` - Artifact and runtime descriptor, and the gated writer

pub mod artifact;
pub mod builtin;
pub mod external;

use std::path::PathBuf;

use async_trait::async_trait;
use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};
use crate::frontend::diagnostics::Diagnostic;
use crate::frontend::resolver::ReferenceSet;
use crate::frontend::source::SourceUnit;
use crate::session::CompilationOptions;

pub use builtin::BuiltinCompiler;
pub use external::ExternalCompiler;

/// Everything a backend gets to see.
#[derive(Debug, Clone, Copy)]
pub struct CompileInput<'a> {
    pub assembly_name: &'a str,
    pub source: &'a SourceUnit,
    pub references: &'a ReferenceSet,
    pub options: &'a CompilationOptions,
}

/// What a backend produced. `binary` is ignored when any diagnostic is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub binary: Option<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Backend failures that are not compiler diagnostics.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BackendError {
    #[error("failed to start compiler '{program}'")]
    #[diagnostic(code(forgec::backend::spawn), help("check `compiler.command` in forgec.toml"))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler '{program}' did not finish within {seconds}s")]
    #[diagnostic(code(forgec::backend::timeout))]
    Timeout { program: String, seconds: u64 },

    #[error("compiler '{program}' exited with {status} without reporting an error:\n{output}")]
    #[diagnostic(code(forgec::backend::failed))]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    #[error("compiler reported success but produced no binary")]
    #[diagnostic(code(forgec::backend::no_output))]
    NoOutput,

    #[error("backend I/O on '{}' failed", .path.display())]
    #[diagnostic(code(forgec::backend::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A compiler backend: one source unit in, a binary and/or diagnostics out.
///
/// Implementations must be deterministic (same input, same output) and report every diagnostic they find in a
/// single call.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, input: CompileInput<'_>) -> Result<CompileOutput, BackendError>;
}

/// Build the backend selected by the configuration.
pub fn from_config(config: &BackendConfig) -> Box<dyn Compiler> {
    match config.backend {
        BackendKind::Builtin => Box::new(BuiltinCompiler::new()),
        BackendKind::External => Box::new(ExternalCompiler::from_config(config)),
    }
}
