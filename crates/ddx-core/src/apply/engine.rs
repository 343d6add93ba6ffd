//! Rendering an asset tree into a target directory.

use std::collections::BTreeMap;

use ddx_content::{Format, MergeOutcome};
use ddx_fs::{NormalizedPath, StagedWrites};

use super::report::{
    ApplyReport, Classification, ConflictRecord, NodeOutcome, Resolution, Strategy,
};
use super::source::{AssetContent, AssetTree};
use crate::error::ApplyError;
use crate::substitute::{Bindings, Strictness, substitute};

/// Parameters for one apply pass.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Default reconciliation for conflicting files
    pub strategy: Strategy,
    /// Classify everything but write nothing
    pub dry_run: bool,
    pub strictness: Strictness,
    /// Per-path decisions, keyed by rendered target path; these win over
    /// `strategy`
    pub decisions: BTreeMap<NormalizedPath, Resolution>,
}

impl ApplyOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Record an explicit decision for `path`.
    pub fn decide(mut self, path: impl Into<NormalizedPath>, resolution: Resolution) -> Self {
        self.decisions.insert(path.into(), resolution);
        self
    }
}

/// What to write for one node, if anything.
struct Planned {
    classification: Classification,
    write: Option<Vec<u8>>,
    conflict: Option<ConflictRecord>,
}

/// Render `tree` into `target` and reconcile against existing files.
///
/// Every node is rendered and classified before anything is written.
/// Writes are then flushed all-or-nothing. A dry run stops before the
/// flush, so both modes report identical classifications. If an `Ask`
/// conflict is left undecided, nothing is written and
/// [`ApplyReport::needs_decision`] is true.
///
/// # Errors
///
/// - [`ApplyError::Aborted`] when rendering fails, a target path escapes
///   `target`, or the flush fails; no file is modified
/// - [`ApplyError::PermissionDenied`] when a target cannot be read or written
pub fn apply(
    tree: &AssetTree,
    target: &NormalizedPath,
    bindings: &Bindings,
    options: &ApplyOptions,
) -> Result<ApplyReport, ApplyError> {
    let mut report = ApplyReport {
        dry_run: options.dry_run,
        ..ApplyReport::default()
    };
    let mut staged = StagedWrites::new();

    for (completed, node) in tree.nodes().iter().enumerate() {
        let abort = |reason: String| ApplyError::Aborted {
            reason,
            nodes_completed: completed,
        };

        let rendered_path = substitute(node.path.as_str(), bindings, options.strictness)
            .map_err(|e| abort(format!("{}: {e}", node.path)))?;
        let relative = NormalizedPath::new(&rendered_path)
            .ensure_relative()
            .map_err(|e| abort(e.to_string()))?;
        if relative.as_str().is_empty() {
            return Err(abort(format!("{} renders to an empty path", node.path)));
        }
        let destination = target.join(relative.as_str());

        let incoming = match &node.content {
            AssetContent::Text(text) => substitute(text, bindings, options.strictness)
                .map_err(|e| abort(format!("{}: {e}", node.path)))?
                .into_bytes(),
            AssetContent::Binary(bytes) => bytes.clone(),
        };

        let existing = read_existing(&destination, completed)?;
        let strategy = options
            .decisions
            .get(&relative)
            .copied()
            .map(Strategy::from)
            .unwrap_or(options.strategy);
        let planned = plan(&relative, existing, incoming, strategy);

        tracing::debug!(path = %relative, classification = ?planned.classification, "Asset classified");
        if let Some(content) = planned.write {
            staged.stage(destination, content);
        }
        if let Some(conflict) = planned.conflict {
            report.conflicts.push(conflict);
        }
        report.outcomes.push(NodeOutcome {
            path: relative,
            classification: planned.classification,
        });
    }

    if report.needs_decision() {
        tracing::info!(
            pending = report.pending().count(),
            "Apply awaiting conflict decisions, nothing written"
        );
        return Ok(report);
    }
    if options.dry_run {
        return Ok(report);
    }

    let nodes_completed = tree.len();
    report.written = staged.commit().map_err(|e| {
        if e.is_permission_denied() {
            match e {
                ddx_fs::Error::Io { path, .. } => ApplyError::PermissionDenied { path },
                other => ApplyError::Aborted {
                    reason: other.to_string(),
                    nodes_completed,
                },
            }
        } else {
            ApplyError::Aborted {
                reason: e.to_string(),
                nodes_completed,
            }
        }
    })?;

    tracing::info!(
        target = %target,
        written = report.written,
        conflicts = report.conflicts.len(),
        "Assets applied"
    );
    Ok(report)
}

fn read_existing(path: &NormalizedPath, completed: usize) -> Result<Option<Vec<u8>>, ApplyError> {
    let native = path.to_native();
    if native.is_dir() {
        return Err(ApplyError::Aborted {
            reason: format!("{path} is a directory"),
            nodes_completed: completed,
        });
    }
    match std::fs::read(&native) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ApplyError::PermissionDenied { path: native })
        }
        Err(e) => Err(ApplyError::Aborted {
            reason: format!("failed to read {path}: {e}"),
            nodes_completed: completed,
        }),
    }
}

fn plan(
    relative: &NormalizedPath,
    existing: Option<Vec<u8>>,
    incoming: Vec<u8>,
    strategy: Strategy,
) -> Planned {
    let Some(existing) = existing else {
        return Planned {
            classification: Classification::Create,
            write: Some(incoming),
            conflict: None,
        };
    };
    if existing == incoming {
        return Planned {
            classification: Classification::Unchanged,
            write: None,
            conflict: None,
        };
    }

    let conflict = ConflictRecord {
        path: relative.clone(),
        existing: String::from_utf8_lossy(&existing).into_owned(),
        incoming: String::from_utf8_lossy(&incoming).into_owned(),
        strategy,
    };

    let (classification, write) = match strategy {
        Strategy::Skip => (Classification::Skip, None),
        Strategy::Overwrite => (Classification::Update, Some(incoming)),
        Strategy::Ask => (Classification::Conflict, None),
        Strategy::Merge => match (std::str::from_utf8(&existing), std::str::from_utf8(&incoming)) {
            (Ok(existing_text), Ok(incoming_text)) => {
                let format = relative.extension().and_then(Format::from_extension);
                match ddx_content::merge(format, existing_text, incoming_text) {
                    MergeOutcome::Clean(merged) if merged.as_bytes() == existing.as_slice() => {
                        (Classification::Skip, None)
                    }
                    MergeOutcome::Clean(merged) => {
                        (Classification::Update, Some(merged.into_bytes()))
                    }
                    MergeOutcome::Conflicted { content, .. } => {
                        (Classification::Conflict, Some(content.into_bytes()))
                    }
                }
            }
            _ => {
                tracing::warn!(path = %relative, "Binary asset cannot be merged, keeping existing file");
                (Classification::Conflict, None)
            }
        },
    };

    Planned {
        classification,
        write,
        conflict: Some(conflict),
    }
}
