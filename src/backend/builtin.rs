//! Builtin backend
//!
//! A self-contained backend for C-family sources that needs no external toolchain. It does not generate code: it
//! performs the structural checks a real compiler front end would reject first, and packages a clean source into a
//! deterministic binary image.
//!
//! ## Checks
//!
//! One pass over the text, skipping `//` and `/* */` comments, string literals (regular, verbatim `@"..."`,
//! interpolated `$"..."` and raw `"""..."""`) and character literals. The holes of interpolated literals are
//! scanned as code, so delimiters inside `{...}` must balance.
//!
//! | Code     | Severity | Meaning                                        |
//! |----------|----------|------------------------------------------------|
//! | `FG1001` | error    | opening delimiter never closed                 |
//! | `FG1002` | error    | closing delimiter with no matching opener      |
//! | `FG1010` | error    | unterminated string literal                    |
//! | `FG1011` | error    | unterminated character literal                 |
//! | `FG1012` | error    | unterminated block comment                     |
//! | `FG5001` | error    | console application with no code at all        |
//! | `FG2001` | warning  | library with no code at all                    |
//!
//! ## Image layout
//!
//! All integers little-endian, strings as `u32` length + UTF-8 bytes:
//! magic `FGIM`, `u16` format version, forgec version, assembly name, target/optimization/platform as `u8`,
//! `u32` reference count followed by (name, fingerprint) pairs sorted by name, the 32-byte BLAKE3 digest of the
//! source, then the source text.

use async_trait::async_trait;

use crate::backend::{BackendError, CompileInput, CompileOutput, Compiler};
use crate::frontend::diagnostics::Diagnostic;
use crate::frontend::source::SourceUnit;
use crate::session::{OptimizationLevel, Platform, TargetKind};
use crate::version::FORGEC_VERSION;

pub const IMAGE_MAGIC: &[u8; 4] = b"FGIM";
pub const IMAGE_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCompiler;

impl BuiltinCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compiler for BuiltinCompiler {
    async fn compile(&self, input: CompileInput<'_>) -> Result<CompileOutput, BackendError> {
        let scan = Scanner::new(input.source).run();

        let mut diagnostics = scan.diagnostics;
        if !scan.has_code {
            match input.options.target {
                TargetKind::ConsoleApplication => diagnostics.push(Diagnostic::error(
                    "FG5001",
                    "program does not contain an entry point",
                    None,
                )),
                TargetKind::DynamicallyLinkedLibrary => {
                    diagnostics.push(Diagnostic::warning("FG2001", "source file is empty", None))
                }
            }
        }

        let binary = if diagnostics.iter().any(Diagnostic::is_error) {
            None
        } else {
            Some(build_image(&input))
        };
        tracing::debug!(diagnostics = diagnostics.len(), emitted = binary.is_some(), "builtin backend finished");

        Ok(CompileOutput { binary, diagnostics })
    }
}

// ============================================================================
// Structural scan
// ============================================================================

struct ScanResult {
    diagnostics: Vec<Diagnostic>,
    /// Whether anything other than whitespace and comments was seen
    has_code: bool,
}

struct Scanner<'a> {
    source: &'a SourceUnit,
    bytes: &'a [u8],
    pos: usize,
    /// Open delimiters and their byte offsets
    open: Vec<(u8, usize)>,
    /// Entries of `open` below this index belong to code outside the current interpolation hole
    floor: usize,
    diagnostics: Vec<Diagnostic>,
    has_code: bool,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a SourceUnit) -> Self {
        Self {
            source,
            bytes: source.text().as_bytes(),
            pos: 0,
            open: Vec::new(),
            floor: 0,
            diagnostics: Vec::new(),
            has_code: false,
        }
    }

    fn run(mut self) -> ScanResult {
        while self.pos < self.bytes.len() {
            self.step();
        }

        // Anything still open at end of input, in source order
        for (delim, offset) in std::mem::take(&mut self.open) {
            self.unclosed(delim, offset);
        }

        ScanResult {
            diagnostics: self.diagnostics,
            has_code: self.has_code,
        }
    }

    /// Consume one token of code at `self.pos`.
    fn step(&mut self) {
        let start = self.pos;
        let b = self.bytes[start];
        match b {
            b'/' if self.peek(1) == Some(b'/') => return self.skip_line(),
            b'/' if self.peek(1) == Some(b'*') => return self.skip_block_comment(),
            b'"' => self.string(start, start, false, 0),
            b'$' | b'@' => self.prefixed(start),
            b'\'' => self.char_literal(start),
            b'(' | b'[' | b'{' => {
                self.open.push((b, start));
                self.pos += 1;
            }
            b')' | b']' | b'}' => {
                self.close(b, start);
                self.pos += 1;
            }
            _ => self.pos += 1,
        }
        if !b.is_ascii_whitespace() {
            self.has_code = true;
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn skip_line(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.pos;
        let body = &self.bytes[start + 2..];
        match body.windows(2).position(|w| w == b"*/") {
            Some(end) => self.pos = start + 2 + end + 2,
            None => {
                self.report("FG1012", "unterminated block comment", start);
                self.pos = self.bytes.len();
            }
        }
    }

    /// `$"..."`, `@"..."`, `$@"..."`, `@$"..."` and friends; a lone `$`/`@` is ordinary code.
    fn prefixed(&mut self, start: usize) {
        let mut quote = start;
        while matches!(self.bytes.get(quote), Some(b'$' | b'@')) {
            quote += 1;
        }
        if self.bytes.get(quote) == Some(&b'"') {
            let prefix = &self.bytes[start..quote];
            let verbatim = prefix.contains(&b'@');
            let dollars = prefix.iter().filter(|&&b| b == b'$').count();
            self.string(start, quote, verbatim, dollars);
        } else {
            self.pos = quote;
        }
    }

    /// A string literal opening at `quote`. `dollars` is the number of `$` in its prefix; zero means no holes.
    fn string(&mut self, start: usize, quote: usize, verbatim: bool, dollars: usize) {
        let run = self.bytes[quote..].iter().take_while(|&&b| b == b'"').count();
        if !verbatim && run >= 3 {
            return self.raw_string(start, quote + run, run, dollars);
        }

        let mut i = quote + 1;
        loop {
            match self.bytes.get(i) {
                None => return self.unterminated_string(start),
                Some(b'"') if verbatim && self.bytes.get(i + 1) == Some(&b'"') => i += 2,
                Some(b'"') => {
                    self.pos = i + 1;
                    return;
                }
                Some(b'\\') if !verbatim => i += 2,
                Some(b'\n' | b'\r') if !verbatim => {
                    self.report("FG1010", "newline in string literal", start);
                    self.pos = i;
                    return;
                }
                // `{{` and `}}` are literal braces
                Some(b'{' | b'}') if dollars > 0 && self.bytes.get(i + 1) == self.bytes.get(i) => i += 2,
                Some(b'{') if dollars > 0 => match self.hole(i + 1, 1) {
                    Some(end) => i = end,
                    None => return self.unterminated_string(start),
                },
                Some(_) => i += 1,
            }
        }
    }

    /// Body of a raw literal starting at `body`, closed by `run` quotes. With `dollars` set, a run of at least
    /// that many `{` opens a hole with its last `dollars` braces.
    fn raw_string(&mut self, start: usize, body: usize, run: usize, dollars: usize) {
        let delimiter = vec![b'"'; run];
        let mut i = body;
        while i < self.bytes.len() {
            if self.bytes[i..].starts_with(&delimiter) {
                let mut close = i + run;
                while self.bytes.get(close) == Some(&b'"') {
                    close += 1;
                }
                self.pos = close;
                return;
            }
            if dollars > 0 && self.bytes[i] == b'{' {
                let braces = self.bytes[i..].iter().take_while(|&&b| b == b'{').count();
                if braces >= dollars {
                    match self.hole(i + braces, dollars) {
                        Some(end) => i = end,
                        None => return self.unterminated_string(start),
                    }
                } else {
                    i += braces;
                }
                continue;
            }
            i += 1;
        }
        self.unterminated_string(start);
    }

    /// Scan an interpolation hole as code, from `at` up to the `}` that closes it.
    ///
    /// Returns the offset after the (up to `closers`) closing braces, or `None` at end of input.
    fn hole(&mut self, at: usize, closers: usize) -> Option<usize> {
        let outer_floor = self.floor;
        self.floor = self.open.len();
        self.pos = at;

        let end = loop {
            let Some(&b) = self.bytes.get(self.pos) else {
                break None;
            };
            if b == b'}' && !self.open[self.floor..].iter().any(|&(d, _)| d == b'{') {
                for (delim, offset) in self.open.split_off(self.floor) {
                    self.unclosed(delim, offset);
                }
                let braces = self.bytes[self.pos..]
                    .iter()
                    .take(closers)
                    .take_while(|&&c| c == b'}')
                    .count();
                break Some(self.pos + braces);
            }
            self.step();
        };

        self.floor = outer_floor;
        end
    }

    fn unterminated_string(&mut self, start: usize) {
        self.report("FG1010", "unterminated string literal", start);
        self.pos = self.bytes.len();
    }

    fn char_literal(&mut self, start: usize) {
        let mut i = start + 1;
        loop {
            match self.bytes.get(i) {
                Some(b'\'') => {
                    self.pos = i + 1;
                    return;
                }
                Some(b'\\') => i += 2,
                Some(b'\n' | b'\r') | None => {
                    self.report("FG1011", "unterminated character literal", start);
                    self.pos = i.min(self.bytes.len());
                    return;
                }
                Some(_) => i += 1,
            }
        }
    }

    fn close(&mut self, closer: u8, offset: usize) {
        let opener = matching_opener(closer);
        let Some(depth) = self.open[self.floor..]
            .iter()
            .rposition(|&(d, _)| d == opener)
            .map(|i| self.floor + i)
        else {
            self.report("FG1002", format!("unexpected '{}'", closer as char), offset);
            return;
        };

        // Delimiters opened after the matching one were never closed
        let unclosed = self.open.split_off(depth + 1);
        for (delim, at) in unclosed {
            self.unclosed(delim, at);
        }
        self.open.pop();
    }

    fn unclosed(&mut self, delim: u8, offset: usize) {
        let message = format!(
            "unclosed '{}': '{}' expected",
            delim as char,
            matching_closer(delim) as char
        );
        self.report("FG1001", message, offset);
    }

    fn report(&mut self, code: &str, message: impl Into<String>, offset: usize) {
        let position = self.source.position(offset);
        self.diagnostics.push(Diagnostic::error(code, message, Some(position)));
    }
}

fn matching_opener(closer: u8) -> u8 {
    match closer {
        b')' => b'(',
        b']' => b'[',
        _ => b'{',
    }
}

fn matching_closer(opener: u8) -> u8 {
    match opener {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

// ============================================================================
// Image packaging
// ============================================================================

fn build_image(input: &CompileInput<'_>) -> Vec<u8> {
    let text = input.source.text();
    let mut image = Vec::with_capacity(text.len() + 256);

    image.extend_from_slice(IMAGE_MAGIC);
    image.extend_from_slice(&IMAGE_FORMAT_VERSION.to_le_bytes());
    put_str(&mut image, FORGEC_VERSION);
    put_str(&mut image, input.assembly_name);

    image.push(match input.options.target {
        TargetKind::ConsoleApplication => 0,
        TargetKind::DynamicallyLinkedLibrary => 1,
    });
    image.push(match input.options.optimization {
        OptimizationLevel::Debug => 0,
        OptimizationLevel::Release => 1,
    });
    image.push(match input.options.platform {
        Platform::AnyCpu => 0,
        Platform::X86 => 1,
        Platform::X64 => 2,
        Platform::Arm64 => 3,
    });

    let mut references: Vec<_> = input.references.iter().collect();
    references.sort_by(|a, b| a.name.cmp(&b.name));
    image.extend_from_slice(&(references.len() as u32).to_le_bytes());
    for reference in references {
        put_str(&mut image, &reference.name);
        put_str(&mut image, &reference.fingerprint);
    }

    image.extend_from_slice(blake3::hash(text.as_bytes()).as_bytes());
    put_str(&mut image, text);
    image
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

// ============================================================================
// Tests
// ============================================================================
