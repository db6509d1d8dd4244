#![forbid(unsafe_code)]
//! forgec: a single-file compiler driver
//!
//! forgec loads one source file, resolves the reference assemblies it compiles against, hands
//! both to a compiler backend and writes the emitted binary plus a `runtimeconfig.json` sidecar.
//!
//! Pipeline: [`frontend::source`] → [`frontend::resolver`] → [`session::CompilationSession`] →
//! [`backend::artifact`] on success, or [`frontend::diagnostics`] on failure.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//! - **True invariants**: `.expect("INVARIANT: reason")` for conditions that cannot fail, such as compiling a
//!   constant regex.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod frontend;
pub mod session;
pub mod version;

pub use backend::artifact::{Artifact, ArtifactWriter, RuntimeDescriptor};
pub use backend::{CompileInput, CompileOutput, Compiler};
pub use config::DriverConfig;
pub use error::{DriverError, DriverResult};
pub use frontend::diagnostics::{Diagnostic, Position, Severity};
pub use frontend::resolver::{ReferenceHandle, ReferenceResolver, ReferenceSet};
pub use frontend::source::{SourceEncoding, SourceUnit};
pub use session::{CompilationOptions, CompilationSession};
