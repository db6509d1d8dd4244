//! External compiler backend
//!
//! Delegates compilation to a compiler executable such as `csc`. The source is written into a scratch directory,
//! the command line is expanded from the configured argument template, and the tool's output is parsed for
//! diagnostics in the MSBuild canonical format:
//!
//! ```text
//! Hello.cs(3,1): error CS1513: } expected
//! error CS5001: Program does not contain a static 'Main' method suitable for an entry point
//! ```
//!
//! ## Argument placeholders
//!
//! `{source}`, `{output}`, `{assembly}`, `{target}`, `{optimize}`, `{platform}` are substituted inside any
//! argument. An argument that is exactly `{references}` expands to one argument per reference, built from
//! `reference_arg` (`{path}` and `{name}` are substituted there).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::backend::{BackendError, CompileInput, CompileOutput, Compiler};
use crate::config::{BackendConfig, DEFAULT_COMPILER_TIMEOUT_SECS};
use crate::frontend::diagnostics::{Diagnostic, Position, Severity};

static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>.*?)\((?P<line>\d+),(?P<col>\d+)(?:,\d+,\d+)?\)\s*:\s*(?P<sev>error|warning|info)\s+(?P<code>[A-Za-z]+\d+)\s*:\s*(?P<msg>.*)$",
    )
    .expect("INVARIANT: located diagnostic pattern is valid")
});

static UNLOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[^:]*:\s*)?(?P<sev>error|warning|info)\s+(?P<code>[A-Za-z]+\d+)\s*:\s*(?P<msg>.*)$")
        .expect("INVARIANT: unlocated diagnostic pattern is valid")
});

/// Runs a compiler executable.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    program: String,
    args: Vec<String>,
    reference_arg: String,
    timeout: Duration,
}

impl ExternalCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            reference_arg: "-reference:{path}".to_string(),
            timeout: Duration::from_secs(DEFAULT_COMPILER_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            reference_arg: config.reference_arg.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_reference_arg(mut self, reference_arg: impl Into<String>) -> Self {
        self.reference_arg = reference_arg.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Expand the argument template for one invocation.
    fn expand_args(&self, input: &CompileInput<'_>, source: &Path, output: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let output = output.to_string_lossy();
        let substitute = |arg: &str| {
            arg.replace("{source}", &source)
                .replace("{output}", &output)
                .replace("{assembly}", input.assembly_name)
                .replace("{target}", input.options.target.as_flag())
                .replace("{optimize}", input.options.optimization.as_flag())
                .replace("{platform}", input.options.platform.as_flag())
        };

        let mut expanded = Vec::with_capacity(self.args.len() + input.references.len());
        for arg in &self.args {
            if arg == "{references}" {
                expanded.extend(input.references.iter().map(|r| {
                    self.reference_arg
                        .replace("{path}", &r.path.to_string_lossy())
                        .replace("{name}", &r.name)
                }));
            } else {
                expanded.push(substitute(arg));
            }
        }
        expanded
    }
}

#[async_trait]
impl Compiler for ExternalCompiler {
    #[tracing::instrument(skip_all, fields(program = %self.program))]
    async fn compile(&self, input: CompileInput<'_>) -> Result<CompileOutput, BackendError> {
        let scratch = tempfile::Builder::new()
            .prefix("forgec-")
            .tempdir()
            .map_err(|e| BackendError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;

        let source_name = input
            .source
            .path()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.cs", input.assembly_name)));
        let source_path = scratch.path().join(source_name);
        let output_path = scratch.path().join(format!("{}.dll", input.assembly_name));

        tokio::fs::write(&source_path, input.source.text())
            .await
            .map_err(|e| BackendError::Io {
                path: source_path.clone(),
                source: e,
            })?;

        let args = self.expand_args(&input, &source_path, &output_path);
        tracing::debug!(?args, "invoking external compiler");

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&args).current_dir(scratch.path()).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| BackendError::Timeout {
                program: self.program.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| BackendError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}{stderr}");
        let diagnostics = parse_diagnostics(&combined);
        let has_errors = diagnostics.iter().any(Diagnostic::is_error);

        if !output.status.success() && !has_errors {
            return Err(BackendError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                output: combined.trim_end().to_string(),
            });
        }

        let binary = if has_errors {
            None
        } else {
            match tokio::fs::read(&output_path).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(BackendError::Io {
                        path: output_path,
                        source: e,
                    });
                }
            }
        };

        Ok(CompileOutput { binary, diagnostics })
    }
}

/// Extract diagnostics from compiler output, in output order. Lines that are not diagnostics are ignored.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    output.lines().filter_map(|line| parse_line(line.trim_end())).collect()
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    if let Some(caps) = LOCATED.captures(line) {
        let position = Position {
            line: caps["line"].parse().ok()?,
            column: caps["col"].parse().ok()?,
        };
        return Some(Diagnostic::new(
            parse_severity(&caps["sev"]),
            &caps["code"],
            caps["msg"].trim(),
            Some(position),
        ));
    }

    let caps = UNLOCATED.captures(line)?;
    Some(Diagnostic::new(
        parse_severity(&caps["sev"]),
        &caps["code"],
        caps["msg"].trim(),
        None,
    ))
}

fn parse_severity(s: &str) -> Severity {
    match s {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::resolver::{ReferenceHandle, ReferenceSet};
    use crate::frontend::source::{SourceEncoding, SourceUnit};
    use crate::session::CompilationOptions;

    #[test]
    fn test_parse_located_and_unlocated_lines() {
        let output = "Microsoft (R) Visual C# Compiler\n\
                      Hello.cs(3,14): error CS1513: } expected\r\n\
                      Hello.cs(1,1,1,5): warning CS8981: The type name 'hello' only contains lower-cased ascii characters.\n\
                      error CS5001: Program does not contain a static 'Main' method suitable for an entry point\n";
        let diags = parse_diagnostics(output);

        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].code, "CS1513");
        assert_eq!(diags[0].message, "} expected");
        assert_eq!(diags[0].position, Some(Position { line: 3, column: 14 }));
        assert_eq!(diags[1].severity, Severity::Warning);
        assert_eq!(diags[1].position, Some(Position { line: 1, column: 1 }));
        assert_eq!(diags[2].code, "CS5001");
        assert_eq!(diags[2].position, None);
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_diagnostics("Build succeeded.\n0 Warning(s)\n").is_empty());
    }

    #[test]
    fn test_expand_args_substitutes_placeholders_and_references() {
        let source = SourceUnit::new("Hello.cs", "", SourceEncoding::Utf8);
        let refs = ReferenceSet::from_handles(vec![
            ReferenceHandle {
                name: "System.Runtime".into(),
                path: "/rt/System.Runtime.dll".into(),
                fingerprint: "00".into(),
            },
            ReferenceHandle {
                name: "System.Console".into(),
                path: "/rt/System.Console.dll".into(),
                fingerprint: "11".into(),
            },
        ])
        .unwrap();
        let options = CompilationOptions::default();
        let input = CompileInput {
            assembly_name: "Hello",
            source: &source,
            references: &refs,
            options: &options,
        };

        let compiler = ExternalCompiler::new(
            "csc",
            vec![
                "-target:{target}".into(),
                "-optimize{optimize}".into(),
                "{references}".into(),
                "-out:{output}".into(),
                "{source}".into(),
            ],
        );
        let args = compiler.expand_args(&input, Path::new("/tmp/Hello.cs"), Path::new("/tmp/Hello.dll"));
        assert_eq!(
            args,
            vec![
                "-target:exe",
                "-optimize+",
                "-reference:/rt/System.Runtime.dll",
                "-reference:/rt/System.Console.dll",
                "-out:/tmp/Hello.dll",
                "/tmp/Hello.cs",
            ]
        );
    }

    #[test]
    fn test_deadline_is_finite_by_default() {
        let compiler = ExternalCompiler::new("csc", Vec::new());
        assert_eq!(compiler.timeout, Duration::from_secs(DEFAULT_COMPILER_TIMEOUT_SECS));

        let config = BackendConfig {
            timeout_secs: 5,
            ..BackendConfig::default()
        };
        assert_eq!(ExternalCompiler::from_config(&config).timeout, Duration::from_secs(5));
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        async fn run_script(script: &str, timeout: Option<Duration>) -> Result<CompileOutput, BackendError> {
            let source = SourceUnit::new("Hello.cs", "class Hello {}", SourceEncoding::Utf8);
            let refs = ReferenceSet::default();
            let options = CompilationOptions::default();
            let input = CompileInput {
                assembly_name: "Hello",
                source: &source,
                references: &refs,
                options: &options,
            };

            let mut compiler = ExternalCompiler::new(
                "sh",
                vec!["-c".into(), script.into(), "sh".into(), "{source}".into(), "{output}".into()],
            );
            if let Some(limit) = timeout {
                compiler = compiler.with_timeout(limit);
            }
            compiler.compile(input).await
        }

        #[tokio::test]
        async fn test_successful_tool_output_is_read() {
            let output = run_script(r#"cat "$1" > "$2""#, None).await.unwrap();
            assert_eq!(output.binary.as_deref(), Some(b"class Hello {}".as_slice()));
            assert!(output.diagnostics.is_empty());
        }

        #[tokio::test]
        async fn test_reported_errors_become_diagnostics() {
            let output = run_script(r#"echo "$1(1,13): error CS1513: } expected"; exit 1"#, None)
                .await
                .unwrap();
            assert!(output.binary.is_none());
            assert_eq!(output.diagnostics.len(), 1);
            assert_eq!(output.diagnostics[0].position, Some(Position { line: 1, column: 13 }));
        }

        #[tokio::test]
        async fn test_silent_failure_is_a_backend_error() {
            let err = run_script("echo boom >&2; exit 3", None).await.unwrap_err();
            assert!(matches!(err, BackendError::Failed { ref output, .. } if output == "boom"));
        }

        #[tokio::test]
        async fn test_deadline_is_enforced() {
            let err = run_script("sleep 5", Some(Duration::from_millis(100))).await.unwrap_err();
            assert!(matches!(err, BackendError::Timeout { .. }));
        }

        #[tokio::test]
        async fn test_missing_program_is_spawn_error() {
            let source = SourceUnit::new("Hello.cs", "", SourceEncoding::Utf8);
            let refs = ReferenceSet::default();
            let options = CompilationOptions::default();
            let input = CompileInput {
                assembly_name: "Hello",
                source: &source,
                references: &refs,
                options: &options,
            };
            let err = ExternalCompiler::new("forgec-no-such-compiler", Vec::new())
                .compile(input)
                .await
                .unwrap_err();
            assert!(matches!(err, BackendError::Spawn { .. }));
        }
    }
}
