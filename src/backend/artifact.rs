//! Artifacts and the gated artifact writer
//!
//! Writes:
//! - the emitted binary, at the output path
//! - `<output stem>.runtimeconfig.json`, next to the binary
//!
//! The binary is always written first. If it fails, the descriptor is never written; if the descriptor fails, the
//! binary is removed again. Either both files exist afterwards or neither does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};
use crate::frontend::diagnostics::Diagnostic;

/// Suffix of the runtime descriptor sidecar
pub const DESCRIPTOR_SUFFIX: &str = ".runtimeconfig.json";

/// A successfully compiled unit, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub binary: Vec<u8>,
    pub descriptor: RuntimeDescriptor,
    /// Non-error diagnostics produced alongside the binary
    pub diagnostics: Vec<Diagnostic>,
}

/// The `runtimeconfig.json` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDescriptor {
    pub runtime_options: RuntimeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    /// Target framework moniker, e.g. `net9.0`
    pub tfm: String,
    pub framework: Framework,
    /// Runtime feature switches
    pub config_properties: BTreeMap<String, bool>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            tfm: "net9.0".to_string(),
            framework: Framework::default(),
            config_properties: BTreeMap::from([("EnableUnsafeBinaryFormatterSerialization".to_string(), false)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framework {
    pub name: String,
    pub version: String,
}

impl Default for Framework {
    fn default() -> Self {
        Self {
            name: "Microsoft.NETCore.App".to_string(),
            version: "9.0.0".to_string(),
        }
    }
}

impl RuntimeDescriptor {
    pub fn new(runtime_options: RuntimeOptions) -> Self {
        Self { runtime_options }
    }

    /// Pretty-printed JSON, as written to disk.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Path of the descriptor sidecar for an output binary: `<dir>/<output stem>.runtimeconfig.json`, which is where
/// the runtime looks for it. `assembly_name` is used only when the output path has no file stem.
pub fn descriptor_path_for(output_path: &Path, assembly_name: &str) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| assembly_name.to_string());
    let file_name = format!("{stem}{DESCRIPTOR_SUFFIX}");
    match output_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Writes an artifact's binary and descriptor.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_path: PathBuf,
    descriptor_path: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_path: impl Into<PathBuf>, descriptor_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            descriptor_path: descriptor_path.into(),
        }
    }

    /// Writer whose descriptor sits next to the output binary.
    pub fn for_output(output_path: impl Into<PathBuf>, assembly_name: &str) -> Self {
        let output_path = output_path.into();
        let descriptor_path = descriptor_path_for(&output_path, assembly_name);
        Self::new(output_path, descriptor_path)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Write the binary, then the descriptor.
    #[tracing::instrument(skip_all, fields(output = %self.output_path.display(), bytes = artifact.binary.len()))]
    pub async fn write(&self, artifact: &Artifact) -> DriverResult<()> {
        let json = artifact
            .descriptor
            .to_json()
            .map_err(|e| DriverError::io(&self.descriptor_path, e.into()))?;

        tokio::fs::write(&self.output_path, &artifact.binary)
            .await
            .map_err(|e| DriverError::io(&self.output_path, e))?;

        if let Err(e) = tokio::fs::write(&self.descriptor_path, json).await {
            if let Err(cleanup) = tokio::fs::remove_file(&self.output_path).await {
                tracing::warn!(
                    "could not remove '{}' after descriptor write failed: {}",
                    self.output_path.display(),
                    cleanup
                );
            }
            return Err(DriverError::io(&self.descriptor_path, e));
        }

        tracing::debug!(descriptor = %self.descriptor_path.display(), "artifact written");
        Ok(())
    }
}

/// Read a descriptor sidecar back from disk.
pub async fn read_descriptor(path: &Path) -> DriverResult<RuntimeDescriptor> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DriverError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| DriverError::io(path, e.into()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> Artifact {
        Artifact {
            binary: vec![0x4D, 0x5A, 0x90, 0x00],
            descriptor: RuntimeDescriptor::default(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_default_descriptor_json() {
        let json = RuntimeDescriptor::default().to_json().unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "runtimeOptions": {
            "tfm": "net9.0",
            "framework": {
              "name": "Microsoft.NETCore.App",
              "version": "9.0.0"
            },
            "configProperties": {
              "EnableUnsafeBinaryFormatterSerialization": false
            }
          }
        }
        "#);
    }

    #[test]
    fn test_descriptor_path_sits_next_to_output() {
        let path = descriptor_path_for(Path::new("out/bin/Hello.dll"), "Hello");
        assert_eq!(path, PathBuf::from("out/bin/Hello.runtimeconfig.json"));
    }

    #[test]
    fn test_descriptor_follows_renamed_output() {
        let path = descriptor_path_for(Path::new("bin/App.dll"), "Hello");
        assert_eq!(path, PathBuf::from("bin/App.runtimeconfig.json"));
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::for_output(dir.path().join("Hello.dll"), "Hello");
        writer.write(&artifact()).await.unwrap();

        assert_eq!(std::fs::read(writer.output_path()).unwrap(), artifact().binary);
        let descriptor = read_descriptor(writer.descriptor_path()).await.unwrap();
        assert_eq!(descriptor, RuntimeDescriptor::default());
    }

    #[tokio::test]
    async fn test_failed_binary_write_skips_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(
            dir.path().join("missing-dir").join("Hello.dll"),
            dir.path().join("Hello.runtimeconfig.json"),
        );

        let err = writer.write(&artifact()).await.unwrap_err();
        assert!(matches!(err, DriverError::Io { .. }));
        assert!(!writer.descriptor_path().exists());
    }

    #[tokio::test]
    async fn test_failed_descriptor_write_removes_binary() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(
            dir.path().join("Hello.dll"),
            dir.path().join("missing-dir").join("Hello.runtimeconfig.json"),
        );

        assert!(writer.write(&artifact()).await.is_err());
        assert!(!writer.output_path().exists());
    }

    #[test]
    fn test_partial_descriptor_config_fills_defaults() {
        let options: RuntimeOptions = serde_json::from_str(r#"{ "tfm": "net8.0" }"#).unwrap();
        assert_eq!(options.tfm, "net8.0");
        assert_eq!(options.framework, Framework::default());
    }
}
