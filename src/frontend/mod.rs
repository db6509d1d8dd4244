//! forgec frontend
//!
//! Everything that happens before the compiler backend runs, plus the reporting of what it said:
//! - `source`: loading source files into addressable [`source::SourceUnit`]s
//! - `resolver`: resolving reference names to fingerprinted files
//! - `diagnostics`: structured compiler messages and their formatting

pub mod diagnostics;
pub mod resolver;
pub mod source;
