//! Diagnostics and error reporting
//!
//! Diagnostics are produced by a compiler backend during `compile()` and are immutable afterwards. This module only
//! formats them: nothing here does I/O, and output order always matches the order the backend produced.

use std::fmt;

use crate::frontend::source::SourceUnit;

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A structured compiler message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable identifier, e.g. `FG1001` or `CS1513`
    pub code: String,
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        position: Option<Position>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            position,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, position: Option<Position>) -> Self {
        Self::new(Severity::Error, code, message, position)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, position: Option<Position>) -> Self {
        Self::new(Severity::Warning, code, message, position)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>, position: Option<Position>) -> Self {
        Self::new(Severity::Info, code, message, position)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// True if any diagnostic has error severity.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Format diagnostics one per line, in the MSBuild canonical form.
///
/// `file(line,col): severity CODE: message`, or `file: severity CODE: message` when there is no position.
pub fn format(diagnostics: &[Diagnostic], file: &str) -> Vec<String> {
    diagnostics.iter().map(|d| format_one(d, file)).collect()
}

fn format_one(diagnostic: &Diagnostic, file: &str) -> String {
    match diagnostic.position {
        Some(pos) => format!(
            "{file}({pos}): {} {}: {}",
            diagnostic.severity, diagnostic.code, diagnostic.message
        ),
        None => format!(
            "{file}: {} {}: {}",
            diagnostic.severity, diagnostic.code, diagnostic.message
        ),
    }
}

/// Render a diagnostic with its source line and a caret under the reported column.
pub fn render(diagnostic: &Diagnostic, source: &SourceUnit, file: &str, color: bool) -> String {
    let paint = |code: &'static str| if color { code } else { "" };
    let red = paint("\x1b[31m");
    let cyan = paint("\x1b[36m");
    let yellow = paint("\x1b[33m");
    let bold = paint("\x1b[1m");
    let reset = paint("\x1b[0m");

    let kind_color = match diagnostic.severity {
        Severity::Error => red,
        Severity::Warning | Severity::Info => yellow,
    };

    let mut out = format!(
        "{bold}{kind_color}{severity}[{code}]{reset}{bold}: {message}{reset}\n",
        severity = diagnostic.severity,
        code = diagnostic.code,
        message = diagnostic.message,
    );

    let Some(pos) = diagnostic.position else {
        out.push_str(&format!("  {cyan}-->{reset} {file}\n"));
        return out;
    };
    out.push_str(&format!("  {cyan}-->{reset} {file}:{}:{}\n", pos.line, pos.column));

    let Some(line_text) = source.line_text(pos.line) else {
        return out;
    };

    let width = pos.line.to_string().len();
    out.push_str(&format!("  {cyan}{:>width$} |{reset}\n", ""));
    out.push_str(&format!("  {cyan}{:>width$} |{reset} {line_text}\n", pos.line));
    out.push_str(&format!(
        "  {cyan}{:>width$} |{reset} {}{kind_color}^{reset}\n",
        "",
        caret_padding(line_text, pos.column),
    ));
    out
}

/// Whitespace that puts a caret under `column`: tabs are copied so the caret lines up however tabs render.
fn caret_padding(line_text: &str, column: usize) -> String {
    line_text
        .chars()
        .take(column.saturating_sub(1))
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .chain(std::iter::repeat(' '))
        .take(column.saturating_sub(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::source::SourceEncoding;

    fn sample() -> Vec<Diagnostic> {
        vec![
            Diagnostic::error("FG1001", "'}' expected", Some(Position { line: 3, column: 1 })),
            Diagnostic::warning("FG2001", "source file is empty", None),
        ]
    }

    #[test]
    fn test_format_preserves_order_and_positions() {
        let lines = format(&sample(), "Hello.cs");
        insta::assert_snapshot!(lines.join("\n"), @r"
        Hello.cs(3,1): error FG1001: '}' expected
        Hello.cs: warning FG2001: source file is empty
        ");
    }

    #[test]
    fn test_format_does_not_sort() {
        let mut diags = sample();
        diags.reverse();
        let lines = format(&diags, "a.cs");
        assert!(lines[0].contains("FG2001"));
        assert!(lines[1].contains("FG1001"));
    }

    #[test]
    fn test_has_errors() {
        assert!(has_errors(&sample()));
        assert!(!has_errors(&sample()[1..]));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn test_render_points_at_column() {
        let source = SourceUnit::new("a.cs", "class A\n  ) {\n", SourceEncoding::Utf8);
        let diag = Diagnostic::error("FG1002", "unexpected ')'", Some(Position { line: 2, column: 3 }));
        let out = render(&diag, &source, "a.cs", false);
        let expected = [
            "error[FG1002]: unexpected ')'",
            "  --> a.cs:2:3",
            "   |",
            "  2 |   ) {",
            "   |   ^",
            "",
        ]
        .join("\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_render_keeps_tabs_in_caret_padding() {
        let source = SourceUnit::new("a.cs", "class A\n\t\tvoid M( {\n", SourceEncoding::Utf8);
        let diag = Diagnostic::error("FG1001", "unclosed '('", Some(Position { line: 2, column: 9 }));
        let out = render(&diag, &source, "a.cs", false);
        assert!(out.ends_with("  2 | \t\tvoid M( {\n   | \t\t      ^\n"), "{out:?}");
    }

    #[test]
    fn test_render_without_position() {
        let source = SourceUnit::new("a.cs", "", SourceEncoding::Utf8);
        let diag = Diagnostic::warning("FG2001", "source file is empty", None);
        let out = render(&diag, &source, "a.cs", false);
        assert_eq!(out, "warning[FG2001]: source file is empty\n  --> a.cs\n");
    }
}
