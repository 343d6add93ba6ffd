//! What an apply pass decided for each asset.

use ddx_fs::NormalizedPath;

/// How a conflicting file is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Leave the existing file untouched
    #[default]
    Skip,
    /// Replace the existing file with the rendered asset
    Overwrite,
    /// Key-level merge for structured formats, conflict markers otherwise
    Merge,
    /// Report the conflict and let the caller decide
    Ask,
}

/// An explicit per-file decision, as supplied after an `Ask` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Skip,
    Overwrite,
    Merge,
}

impl From<Resolution> for Strategy {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Skip => Strategy::Skip,
            Resolution::Overwrite => Strategy::Overwrite,
            Resolution::Merge => Strategy::Merge,
        }
    }
}

/// Outcome for one target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Target did not exist
    Create,
    /// Target already had the rendered content
    Unchanged,
    /// Target replaced or cleanly merged
    Update,
    /// Conflict resolved by keeping the target
    Skip,
    /// Needs attention: markers written, binary unmergeable, or awaiting a decision
    Conflict,
}

/// A rendered asset that differs from an existing target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Target path relative to the apply root
    pub path: NormalizedPath,
    pub existing: String,
    pub incoming: String,
    /// Strategy that handled the conflict
    pub strategy: Strategy,
}

/// Classification of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub path: NormalizedPath,
    pub classification: Classification,
}

/// Result of an apply pass.
///
/// Dry runs and real runs produce the same outcomes; only
/// [`ApplyReport::written`] differs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub dry_run: bool,
    /// One entry per file node, in tree order
    pub outcomes: Vec<NodeOutcome>,
    /// Every differing existing target, in tree order
    pub conflicts: Vec<ConflictRecord>,
    /// Files actually written
    pub written: usize,
}

impl ApplyReport {
    /// Paths classified as `classification`, in tree order.
    pub fn paths(&self, classification: Classification) -> Vec<&NormalizedPath> {
        self.outcomes
            .iter()
            .filter(|o| o.classification == classification)
            .map(|o| &o.path)
            .collect()
    }

    pub fn created(&self) -> Vec<&NormalizedPath> {
        self.paths(Classification::Create)
    }

    pub fn updated(&self) -> Vec<&NormalizedPath> {
        self.paths(Classification::Update)
    }

    pub fn skipped(&self) -> Vec<&NormalizedPath> {
        self.paths(Classification::Skip)
    }

    pub fn conflicted(&self) -> Vec<&NormalizedPath> {
        self.paths(Classification::Conflict)
    }

    pub fn unchanged(&self) -> Vec<&NormalizedPath> {
        self.paths(Classification::Unchanged)
    }

    /// Conflicts waiting for a caller decision.
    pub fn pending(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.iter().filter(|c| c.strategy == Strategy::Ask)
    }

    /// Whether an `Ask` conflict is undecided. Nothing was written if so.
    pub fn needs_decision(&self) -> bool {
        self.pending().next().is_some()
    }
}
