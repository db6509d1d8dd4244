//! Compilation session
//!
//! A [`CompilationSession`] owns exactly one [`SourceUnit`], the resolved [`ReferenceSet`] and the options, and hands
//! them to a [`Compiler`] backend. It is the gate between "the backend said something" and "there is an artifact":
//! any error-severity diagnostic means no artifact.
//!
//! `compile()` memoizes its outcome. Calling it again returns the first result without invoking the backend, so
//! nothing outside the session is touched twice.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::backend::artifact::{Artifact, RuntimeDescriptor};
use crate::backend::{BackendError, CompileInput, Compiler};
use crate::error::{DriverError, DriverResult};
use crate::frontend::diagnostics::{self, Diagnostic};
use crate::frontend::resolver::ReferenceSet;
use crate::frontend::source::SourceUnit;

/// Kind of binary to emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    #[default]
    ConsoleApplication,
    DynamicallyLinkedLibrary,
}

impl TargetKind {
    /// Spelling used on compiler command lines (`-target:exe`).
    pub fn as_flag(self) -> &'static str {
        match self {
            TargetKind::ConsoleApplication => "exe",
            TargetKind::DynamicallyLinkedLibrary => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationLevel {
    Debug,
    #[default]
    Release,
}

impl OptimizationLevel {
    /// Spelling used on compiler command lines (`-optimize+`).
    pub fn as_flag(self) -> &'static str {
        match self {
            OptimizationLevel::Debug => "-",
            OptimizationLevel::Release => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    #[default]
    AnyCpu,
    X86,
    X64,
    Arm64,
}

impl Platform {
    pub fn as_flag(self) -> &'static str {
        match self {
            Platform::AnyCpu => "anycpu",
            Platform::X86 => "x86",
            Platform::X64 => "x64",
            Platform::Arm64 => "arm64",
        }
    }
}

/// Options passed through to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationOptions {
    pub target: TargetKind,
    pub optimization: OptimizationLevel,
    pub platform: Platform,
}

/// Outcome of a compilation: an artifact, or every diagnostic the backend produced.
pub type CompileOutcome = Result<Artifact, Vec<Diagnostic>>;

/// One source file, its references and a backend.
pub struct CompilationSession {
    assembly_name: String,
    source: SourceUnit,
    references: ReferenceSet,
    options: CompilationOptions,
    descriptor: RuntimeDescriptor,
    backend: Box<dyn Compiler>,
    outcome: Option<CompileOutcome>,
}

impl CompilationSession {
    pub fn new(
        assembly_name: impl Into<String>,
        source: SourceUnit,
        references: ReferenceSet,
        backend: Box<dyn Compiler>,
    ) -> Self {
        Self {
            assembly_name: assembly_name.into(),
            source,
            references,
            options: CompilationOptions::default(),
            descriptor: RuntimeDescriptor::default(),
            backend,
            outcome: None,
        }
    }

    pub fn with_options(mut self, options: CompilationOptions) -> Self {
        self.options = options;
        self
    }

    /// Runtime descriptor attached to a successful artifact.
    pub fn with_descriptor(mut self, descriptor: RuntimeDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    pub fn source(&self) -> &SourceUnit {
        &self.source
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Compile the session's source.
    ///
    /// Returns `Ok(Err(diagnostics))` when the backend reported at least one error; the list then holds every
    /// diagnostic, in the order the backend produced them. Backend faults (spawn failure, timeout, missing output)
    /// are `Err`.
    #[tracing::instrument(skip_all, fields(assembly = %self.assembly_name, refs = self.references.len()))]
    pub async fn compile(&mut self) -> DriverResult<CompileOutcome> {
        if let Some(outcome) = &self.outcome {
            tracing::debug!("returning memoized compilation outcome");
            return Ok(outcome.clone());
        }

        let input = CompileInput {
            assembly_name: &self.assembly_name,
            source: &self.source,
            references: &self.references,
            options: &self.options,
        };
        let output = self.backend.compile(input).await?;

        let outcome = if diagnostics::has_errors(&output.diagnostics) {
            Err(output.diagnostics)
        } else {
            let binary = output.binary.ok_or(BackendError::NoOutput)?;
            Ok(Artifact {
                binary,
                descriptor: self.descriptor.clone(),
                diagnostics: output.diagnostics,
            })
        };

        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Like [`compile`](Self::compile), folding error diagnostics into [`DriverError::Compilation`].
    pub async fn compile_artifact(&mut self) -> DriverResult<Artifact> {
        self.compile()
            .await?
            .map_err(|diagnostics| DriverError::Compilation { diagnostics })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CompileOutput;
    use crate::frontend::diagnostics::Position;
    use crate::frontend::source::SourceEncoding;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that returns a canned output and counts invocations.
    struct Canned {
        output: CompileOutput,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Compiler for Canned {
        async fn compile(&self, _input: CompileInput<'_>) -> Result<CompileOutput, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    fn session(output: CompileOutput) -> (CompilationSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = Canned {
            output,
            calls: Arc::clone(&calls),
        };
        let source = SourceUnit::new("Hello.cs", "class Hello {}", SourceEncoding::Utf8);
        let session = CompilationSession::new("Hello", source, ReferenceSet::default(), Box::new(backend));
        (session, calls)
    }

    #[tokio::test]
    async fn test_success_yields_artifact_with_warnings() {
        let warning = Diagnostic::warning("CS0168", "variable declared but never used", None);
        let (mut session, _) = session(CompileOutput {
            binary: Some(vec![1, 2, 3]),
            diagnostics: vec![warning.clone()],
        });

        let artifact = session.compile().await.unwrap().unwrap();
        assert_eq!(artifact.binary, vec![1, 2, 3]);
        assert_eq!(artifact.diagnostics, vec![warning]);
        assert_eq!(artifact.descriptor, RuntimeDescriptor::default());
    }

    #[tokio::test]
    async fn test_any_error_discards_binary() {
        let pos = Some(Position { line: 1, column: 1 });
        let (mut session, _) = session(CompileOutput {
            binary: Some(vec![0xFF]),
            diagnostics: vec![
                Diagnostic::warning("W1", "first", None),
                Diagnostic::error("E1", "second", pos),
            ],
        });

        let diags = session.compile().await.unwrap().unwrap_err();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].code, "W1");
        assert_eq!(diags[1].code, "E1");
    }

    #[tokio::test]
    async fn test_success_without_binary_is_a_fault() {
        let (mut session, _) = session(CompileOutput::default());
        let err = session.compile().await.unwrap_err();
        assert!(matches!(err, DriverError::Backend(BackendError::NoOutput)));
    }

    #[tokio::test]
    async fn test_compile_is_memoized() {
        let (mut session, calls) = session(CompileOutput {
            binary: Some(vec![7]),
            diagnostics: Vec::new(),
        });

        let first = session.compile().await.unwrap();
        let second = session.compile().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compile_artifact_folds_diagnostics() {
        let (mut session, _) = session(CompileOutput {
            binary: None,
            diagnostics: vec![Diagnostic::error("E1", "broken", None)],
        });
        let err = session.compile_artifact().await.unwrap_err();
        assert!(matches!(err, DriverError::Compilation { ref diagnostics } if diagnostics.len() == 1));
    }

    #[test]
    fn test_default_options_match_console_release_anycpu() {
        let options = CompilationOptions::default();
        assert_eq!(options.target, TargetKind::ConsoleApplication);
        assert_eq!(options.optimization, OptimizationLevel::Release);
        assert_eq!(options.platform, Platform::AnyCpu);
    }
}
