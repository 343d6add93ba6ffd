//! Project history as seen from the vendored library.

use chrono::{DateTime, TimeZone, Utc};
use git2::{Oid, Repository};

use crate::Result;
use crate::helpers::library_tree;

/// Information about a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit id
    pub id: String,

    /// First line of the commit message
    pub summary: String,

    /// Commit author name
    pub author: String,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub fn from_commit(commit: &git2::Commit<'_>) -> Self {
        let time = commit.time();
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_default();

        Self {
            id: commit.id().to_string(),
            summary: commit.summary().unwrap_or("").to_string(),
            author: commit.author().name().unwrap_or("Unknown").to_string(),
            timestamp,
        }
    }

    /// Short commit hash (7 characters)
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(7)]
    }
}

/// Project commits since the last synchronization point that changed the
/// library, oldest first.
///
/// Walks first parents back from `head` and stops at the commit that
/// recorded `revision` as a parent (the pull or push that last
/// synchronized the library). Commits whose library tree equals their
/// first parent's are skipped.
pub fn library_changes_since<'r>(
    repo: &'r Repository,
    head: &git2::Commit<'r>,
    revision: Oid,
    prefix: &str,
) -> Result<Vec<git2::Commit<'r>>> {
    let mut changed = Vec::new();
    let mut current = head.clone();

    loop {
        if current.parent_ids().any(|parent| parent == revision) {
            break;
        }
        let Ok(parent) = current.parent(0) else {
            break;
        };
        if library_tree(repo, &current, prefix)? != library_tree(repo, &parent, prefix)? {
            changed.push(current.clone());
        }
        current = parent;
    }

    changed.reverse();
    Ok(changed)
}
