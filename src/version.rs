//! The version of redo.

/// The version of redo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
