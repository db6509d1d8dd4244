//! Driver configuration (`forgec.toml`)
//!
//! Everything the driver would otherwise hard-code lives here: the reference list and its search roots, the
//! compilation options, the backend and the runtime descriptor values. Every section is optional.
//!
//! ```toml
//! [source]
//! encoding = "auto"
//!
//! [references]
//! search_paths = ["/usr/share/dotnet/shared/Microsoft.NETCore.App/9.0.0"]
//! names = ["System.Private.CoreLib", "System.Runtime", "System.Console"]
//! required = ["System.Private.CoreLib"]
//!
//! [compilation]
//! target = "console-application"
//! optimization = "release"
//! platform = "any-cpu"
//!
//! [compiler]
//! backend = "external"
//! command = "csc"
//! timeout_secs = 120
//!
//! [runtime]
//! tfm = "net9.0"
//! framework = { name = "Microsoft.NETCore.App", version = "9.0.0" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::artifact::RuntimeOptions;
use crate::error::{DriverError, DriverResult};
use crate::frontend::resolver::{DEFAULT_REFERENCE_EXTENSION, ReferenceResolver};
use crate::frontend::source::SourceEncoding;
use crate::session::CompilationOptions;

/// Name of the configuration file looked up next to the source and in the working directory
pub const CONFIG_FILE_NAME: &str = "forgec.toml";

/// Deadline for an external compiler run when `compiler.timeout_secs` is unset
pub const DEFAULT_COMPILER_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    pub source: SourceConfig,
    pub references: ReferencesConfig,
    pub compilation: CompilationOptions,
    pub compiler: BackendConfig,
    pub output: OutputConfig,
    pub runtime: RuntimeOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub encoding: SourceEncoding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferencesConfig {
    /// Directories probed for logical reference names, in precedence order
    pub search_paths: Vec<PathBuf>,
    /// References to compile against, in order
    pub names: Vec<String>,
    /// Names that must always be among the references
    pub required: Vec<String>,
    /// Extension probed for logical names
    pub extension: String,
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            names: Vec::new(),
            required: Vec::new(),
            extension: DEFAULT_REFERENCE_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Builtin,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub backend: BackendKind,
    /// Executable for the external backend
    pub command: String,
    /// Argument template for the external backend
    pub args: Vec<String>,
    /// Template for each expanded `{references}` argument
    pub reference_arg: String,
    /// Deadline in seconds for one external compiler run
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Builtin,
            command: "csc".to_string(),
            args: [
                "-nologo",
                "-noconfig",
                "-target:{target}",
                "-optimize{optimize}",
                "-platform:{platform}",
                "-out:{output}",
                "{references}",
                "{source}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            reference_arg: "-reference:{path}".to_string(),
            timeout_secs: DEFAULT_COMPILER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Binary extension; the platform's dynamic-library extension when unset
    pub extension: Option<String>,
}

impl DriverConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> DriverResult<Self> {
        toml::from_str(text).map_err(|e| DriverError::Config {
            path: origin.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Load the configuration for compiling `source_path`.
    ///
    /// An explicit path must exist. Otherwise `forgec.toml` is looked up next to the source, then in the working
    /// directory; if neither exists the defaults are used.
    pub async fn load(explicit: Option<&Path>, source_path: &Path) -> DriverResult<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path).await;
        }

        let beside_source = source_path
            .parent()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        for candidate in [beside_source, PathBuf::from(CONFIG_FILE_NAME)] {
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Self::load_file(&candidate).await;
            }
        }

        tracing::debug!("no {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    async fn load_file(path: &Path) -> DriverResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DriverError::io(path, e))?;
        let config = Self::from_toml(&text, path)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Reference resolver configured from the `[references]` section.
    pub fn resolver(&self) -> ReferenceResolver {
        ReferenceResolver::new(self.references.search_paths.clone())
            .with_extension(self.references.extension.clone())
            .with_required(self.references.required.clone())
    }

    /// Extension (without dot) of the emitted binary.
    pub fn output_extension(&self) -> &str {
        self.output
            .extension
            .as_deref()
            .map(|ext| ext.trim_start_matches('.'))
            .unwrap_or(std::env::consts::DLL_EXTENSION)
    }
}

// ============================================================================
// Tests
// ============================================================================
