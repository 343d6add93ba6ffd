//! Filesystem primitives for DDx
//!
//! Provides forward-slash normalized paths, the well-known project layout,
//! and crash-safe I/O: single-file atomic writes and multi-file staged
//! writes that are flushed all-or-nothing.

pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use constants::DdxPath;
pub use error::{Error, Result};
pub use io::StagedWrites;
pub use path::{NormalizedPath, validate_path_identifier};
