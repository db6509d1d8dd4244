//! forgec version information.
//!
//! The value is taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time. The builtin backend stamps it into
//! every image header, so prefer this constant over repeating `env!("CARGO_PKG_VERSION")`.

/// The forgec version string (for example, `0.1.0`).
pub const FORGEC_VERSION: &str = env!("CARGO_PKG_VERSION");
