//! Managed text regions for DDx.
//!
//! A managed region is a span of a shared document owned by DDx,
//! delimited by a start and end sentinel line:
//!
//! ```text
//! <!-- DDX-META-PROMPT:START -->
//! managed content
//! <!-- DDX-META-PROMPT:END -->
//! ```
//!
//! Everything outside the sentinels belongs to the user and is never
//! modified. [`ManagedRegion::upsert`] and [`ManagedRegion::remove`] are
//! idempotent: applying either twice yields the same document as applying
//! it once.

pub mod error;
pub mod parser;
pub mod writer;

pub use error::{Error, Result};
pub use parser::{ManagedRegion, RegionSpan};
