//! Format detection and merge strategies for DDx assets
//!
//! When a rendered asset collides with an existing project file, the
//! `merge` conflict strategy lands here:
//!
//! - **Structured formats** (JSON, YAML, TOML) get a key-level merge:
//!   keys missing from the existing document are added, keys already
//!   present keep the existing value. Tables recurse; arrays and scalars
//!   are leaves. The incoming document may force specific keys with a
//!   top-level `ddx_override` list of dotted paths.
//! - **Everything else** gets a line diff in which every differing hunk
//!   is written out between conflict markers for manual resolution.
//!
//! [`merge`] picks the right strategy and falls back to the text merge
//! when a structured document does not parse.

pub mod diff;
pub mod error;
pub mod format;
pub mod merge;

pub use diff::{TextMerge, merge_text};
pub use error::{Error, Result};
pub use format::Format;
pub use merge::{MergeOutcome, OVERRIDE_KEY, merge, merge_structured};
