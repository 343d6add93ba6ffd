//! Subtree synchronization of the DDx asset library
//!
//! The upstream library is vendored into a project directory (by default
//! `.ddx/library`) as a git subtree: its files are committed in the
//! project's own history, and every synchronization point is a merge
//! commit whose second parent is the upstream commit it integrated.
//!
//! - [`Synchronizer::pull`] three-way merges a new upstream tip into the
//!   vendored tree, preserving local edits and leaving conflict markers
//!   when edits overlap.
//! - [`Synchronizer::push`] replays (or squashes) local library commits
//!   on top of the last synchronized revision and publishes them without
//!   force, refusing when upstream has moved on.
//!
//! A small TOML marker ([`SyncState`]) inside the vendored directory
//! records the synchronized revision and any pull awaiting resolution.

pub mod commits;
pub mod error;
pub mod helpers;
pub mod push;
pub mod state;
pub mod sync;

pub use commits::CommitInfo;
pub use error::{Error, Error as SyncError, Result};
pub use push::{ChangeSet, PushMode, PushOptions};
pub use state::SyncState;
pub use sync::{SyncConfig, SyncResult, SyncStatus, Synchronizer, has_conflict_markers};
