//! Source loading and position mapping
//!
//! A [`SourceUnit`] is the immutable text of the file being compiled plus a line-offset table. The table is built in
//! one pass and maps any byte offset to a 1-based line/column with a binary search. Line terminators (`\n`, `\r\n`,
//! lone `\r`) are kept in the text as read, so columns match what an editor shows.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};
use crate::frontend::diagnostics::Position;

/// Maximum source file size (100 MB)
///
/// Files larger than this are rejected before they are read.
pub const MAX_SOURCE_SIZE: u64 = 100 * 1024 * 1024;

/// Text encoding of a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    /// Detect a byte-order mark, fall back to UTF-8
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-16le")]
    Utf16Le,
    #[serde(rename = "utf-16be")]
    Utf16Be,
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::Auto => write!(f, "auto"),
            SourceEncoding::Utf8 => write!(f, "UTF-8"),
            SourceEncoding::Utf16Le => write!(f, "UTF-16LE"),
            SourceEncoding::Utf16Be => write!(f, "UTF-16BE"),
        }
    }
}

/// Loaded, addressable source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: PathBuf,
    text: String,
    /// Concrete encoding the text was decoded with (never `Auto`)
    encoding: SourceEncoding,
    /// Byte offset of the first character of every line; always starts with 0
    line_starts: Vec<usize>,
}

impl SourceUnit {
    /// Build a source unit from already-decoded text.
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, encoding: SourceEncoding) -> Self {
        let text = text.into();
        let line_starts = line_starts(&text);
        Self {
            path: path.into(),
            text,
            encoding,
            line_starts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Map a byte offset to a 1-based line and column.
    ///
    /// Offsets past the end clamp to the end of the text. Offsets inside a multi-byte character resolve to that
    /// character. The column counts characters, not bytes.
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }

        // line_starts[0] == 0, so partition_point is at least 1
        let line_idx = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start..offset].chars().count() + 1;

        Position {
            line: line_idx + 1,
            column,
        }
    }

    /// Text of a 1-based line, without its terminator.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self.line_starts.get(line).copied().unwrap_or(self.text.len());
        Some(self.text[start..end].trim_end_matches(['\n', '\r']))
    }
}

/// Compute line start offsets in a single pass.
fn line_starts(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut starts = vec![0];
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\n' => starts.push(i + 1),
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => starts.push(i + 1),
            _ => {}
        }
    }
    starts
}

/// Read a source file and decode it under the declared encoding.
///
/// ## Errors
///
/// - [`DriverError::Io`] if the file does not exist or cannot be read
/// - [`DriverError::SourceTooLarge`] if the file exceeds [`MAX_SOURCE_SIZE`]
/// - [`DriverError::Encoding`] if the bytes are not valid text
#[tracing::instrument(skip_all, fields(path = %path.display(), encoding = %encoding))]
pub async fn load(path: &Path, encoding: SourceEncoding) -> DriverResult<SourceUnit> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| DriverError::io(path, e))?;
    if metadata.len() > MAX_SOURCE_SIZE {
        return Err(DriverError::SourceTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: MAX_SOURCE_SIZE,
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| DriverError::io(path, e))?;
    let (text, resolved) = decode(&bytes, encoding).map_err(|(encoding, offset)| DriverError::Encoding {
        path: path.to_path_buf(),
        encoding,
        offset,
    })?;

    let unit = SourceUnit::new(path, text, resolved);
    tracing::debug!(bytes = bytes.len(), lines = unit.line_count(), "loaded source");
    Ok(unit)
}

/// Decode raw bytes, stripping a leading byte-order mark.
///
/// On failure returns the concrete encoding that was attempted and the byte offset of the first invalid sequence.
pub fn decode(bytes: &[u8], encoding: SourceEncoding) -> Result<(String, SourceEncoding), (SourceEncoding, usize)> {
    const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

    let encoding = match encoding {
        SourceEncoding::Auto if bytes.starts_with(&[0xFF, 0xFE]) => SourceEncoding::Utf16Le,
        SourceEncoding::Auto if bytes.starts_with(&[0xFE, 0xFF]) => SourceEncoding::Utf16Be,
        SourceEncoding::Auto => SourceEncoding::Utf8,
        other => other,
    };

    let decoded = match encoding {
        SourceEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        SourceEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        _ => {
            let skip = if bytes.starts_with(UTF8_BOM) { UTF8_BOM.len() } else { 0 };
            std::str::from_utf8(&bytes[skip..])
                .map(str::to_string)
                .map_err(|e| skip + e.valid_up_to())
        }
    };
    decoded.map(|text| (text, encoding)).map_err(|offset| (encoding, offset))
}

/// Decode UTF-16 code units; the error is the byte offset of the first bad unit.
fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String, usize> {
    let mut units: Vec<u16> = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]])).collect();
    let skip = usize::from(units.first() == Some(&0xFEFF));
    units.drain(..skip);

    let mut text = String::with_capacity(units.len());
    let mut index = skip;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => {
                text.push(c);
                index += c.len_utf16();
            }
            Err(_) => return Err(index * 2),
        }
    }

    if bytes.len() % 2 != 0 {
        return Err(bytes.len() - 1);
    }
    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================
