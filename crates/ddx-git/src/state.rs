//! The sync-state marker stored inside the vendored library.
//!
//! The marker lives at `<prefix>/.ddx-sync`, is committed together with
//! the library, and is stripped from every tree compared with or
//! published to upstream.

use chrono::{DateTime, Utc};
use ddx_fs::constants::SYNC_MARKER;
use ddx_fs::{NormalizedPath, io};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Last-known upstream revision integrated into a project, plus any
/// pull that is waiting on manual conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Upstream repository the library was pulled from
    pub upstream_url: String,
    /// Upstream branch tracked by pulls
    pub upstream_ref: String,
    /// Upstream commit the vendored tree was last synchronized with
    pub revision: String,
    /// When `revision` was recorded
    pub synced_at: DateTime<Utc>,
    /// Upstream commit of a pull whose conflicts are not yet resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_revision: Option<String>,
    /// Project-relative paths holding conflict markers from that pull
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl SyncState {
    pub fn new(upstream_url: &str, upstream_ref: &str, revision: git2::Oid) -> Self {
        Self {
            upstream_url: upstream_url.to_string(),
            upstream_ref: upstream_ref.to_string(),
            revision: revision.to_string(),
            synced_at: Utc::now(),
            pending_revision: None,
            conflicts: Vec::new(),
        }
    }

    pub fn revision_oid(&self) -> Result<git2::Oid> {
        Ok(git2::Oid::from_str(&self.revision)?)
    }

    pub fn pending_oid(&self) -> Result<Option<git2::Oid>> {
        self.pending_revision
            .as_deref()
            .map(git2::Oid::from_str)
            .transpose()
            .map_err(Error::from)
    }

    /// Whether a pull is waiting for its conflicts to be resolved.
    pub fn is_pending(&self) -> bool {
        self.pending_revision.is_some()
    }

    pub fn parse(path: &str, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::State {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::State {
            path: SYNC_MARKER.to_string(),
            message: e.to_string(),
        })
    }

    /// Marker location for a library vendored at `library_dir`.
    pub fn marker_path(library_dir: &NormalizedPath) -> NormalizedPath {
        library_dir.join(SYNC_MARKER)
    }

    /// Load the marker from the working tree. `None` when nothing has
    /// been pulled yet.
    pub fn load(library_dir: &NormalizedPath) -> Result<Option<Self>> {
        let path = Self::marker_path(library_dir);
        match io::read_text_optional(&path)? {
            Some(content) => Self::parse(path.as_str(), &content).map(Some),
            None => Ok(None),
        }
    }

    /// Atomically write the marker into the working tree.
    pub fn save(&self, library_dir: &NormalizedPath) -> Result<()> {
        io::write_text(&Self::marker_path(library_dir), &self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_working_tree() {
        let temp = TempDir::new().unwrap();
        let dir = NormalizedPath::new(temp.path());
        let mut state = SyncState::new(
            "https://example.com/lib.git",
            "main",
            git2::Oid::from_str("0123456789abcdef0123456789abcdef01234567").unwrap(),
        );
        state.conflicts.push(".ddx/library/a.md".into());

        state.save(&dir).unwrap();
        assert_eq!(SyncState::load(&dir).unwrap(), Some(state));
    }

    #[test]
    fn missing_marker_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(SyncState::load(&NormalizedPath::new(temp.path())).unwrap().is_none());
    }

    #[test]
    fn garbage_marker_is_state_error() {
        assert!(matches!(
            SyncState::parse("x", "revision = 3"),
            Err(Error::State { .. })
        ));
    }
}
