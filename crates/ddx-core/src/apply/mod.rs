//! Resource application: render library assets into a project.
//!
//! An [`AssetTree`] is loaded from the library, every node is rendered
//! through the substitution engine, and the result is reconciled against
//! the target directory with a [`Strategy`]. See [`apply`].

mod engine;
mod report;
mod source;

pub use engine::{ApplyOptions, apply};
pub use report::{
    ApplyReport, Classification, ConflictRecord, NodeOutcome, Resolution, Strategy,
};
pub use source::{AssetContent, AssetNode, AssetTree, ResourceMatcher};
