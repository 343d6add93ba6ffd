//! Pulling upstream library revisions into the vendored subtree.

use std::fs;

use ddx_fs::{NormalizedPath, io};
use git2::build::CheckoutBuilder;
use git2::{IndexAddOption, MergeFileOptions, MergeOptions, Oid, Repository, ResetType};

use crate::commits::CommitInfo;
use crate::helpers::{self, subtree_message};
use crate::state::SyncState;
use crate::{Error, Result};

/// Where the library comes from and where it is vendored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upstream repository URL or local path
    pub url: String,
    /// Upstream branch tracked by default
    pub branch: String,
    /// Vendored directory, relative to the project root
    pub prefix: String,
}

/// Outcome of a synchronization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// Nothing to integrate or contribute
    UpToDate { revision: String },
    /// The library now matches `revision`; `changed` lists the
    /// project-relative paths the step modified
    Clean {
        revision: String,
        previous: Option<String>,
        changed: Vec<String>,
    },
    /// Merge written to the working tree with conflict markers in `conflicted`
    PartialWithConflicts {
        revision: String,
        conflicted: Vec<String>,
    },
    /// Local library history published upstream
    Pushed {
        revision: String,
        target: String,
        commits: Vec<CommitInfo>,
    },
}

impl SyncResult {
    pub fn revision(&self) -> &str {
        match self {
            Self::UpToDate { revision }
            | Self::Clean { revision, .. }
            | Self::PartialWithConflicts { revision, .. }
            | Self::Pushed { revision, .. } => revision,
        }
    }

    /// Whether the working tree changed in a way that warrants
    /// re-resolving configuration.
    pub fn files_changed(&self) -> bool {
        match self {
            Self::UpToDate { .. } | Self::Pushed { .. } => false,
            Self::Clean { changed, .. } => !changed.is_empty(),
            Self::PartialWithConflicts { .. } => true,
        }
    }
}

/// Summary of the vendored library's relationship with upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Recorded marker, `None` before the first pull
    pub state: Option<SyncState>,
    /// A pull is waiting for conflict resolution
    pub pending: bool,
    /// The committed library differs from the recorded upstream revision
    pub local_changes: bool,
}

/// Subtree synchronizer for one project repository.
pub struct Synchronizer {
    repo: Repository,
    root: NormalizedPath,
    config: SyncConfig,
    prefix: String,
}

impl Synchronizer {
    /// Open the git repository at `project_root`.
    pub fn open(project_root: impl Into<NormalizedPath>, config: SyncConfig) -> Result<Self> {
        let root: NormalizedPath = project_root.into();
        let prefix = NormalizedPath::new(&config.prefix)
            .ensure_relative()
            .map_err(|e| Error::InvalidPrefix {
                prefix: config.prefix.clone(),
                reason: e.to_string(),
            })?;
        if prefix.as_str().is_empty() {
            return Err(Error::InvalidPrefix {
                prefix: config.prefix.clone(),
                reason: "the library cannot be vendored at the project root".into(),
            });
        }

        let repo = Repository::open(root.to_native())?;
        Ok(Self {
            repo,
            root,
            prefix: prefix.as_str().to_string(),
            config,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Cleaned vendored prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn library_dir(&self) -> NormalizedPath {
        self.root.join(&self.prefix)
    }

    /// The marker as currently present in the working tree.
    pub fn state(&self) -> Result<Option<SyncState>> {
        SyncState::load(&self.library_dir())
    }

    pub(crate) fn require_state(&self) -> Result<SyncState> {
        self.state()?.ok_or_else(|| Error::NotVendored {
            prefix: self.prefix.clone(),
        })
    }

    fn ensure_not_pending(&self, state: Option<&SyncState>) -> Result<()> {
        match state {
            Some(state) if state.is_pending() => Err(Error::ConflictsPresent {
                paths: state.conflicts.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Integrate `upstream_ref` (default: the configured branch) into the
    /// vendored library with a three-way merge.
    ///
    /// Local edits under the prefix are merged against the last
    /// synchronized revision. Overlapping edits are written with conflict
    /// markers and reported as [`SyncResult::PartialWithConflicts`]; call
    /// [`Synchronizer::complete_pull`] once they are resolved.
    pub fn pull(&self, upstream_ref: Option<&str>) -> Result<SyncResult> {
        let state = self.state()?;
        self.ensure_not_pending(state.as_ref())?;
        helpers::ensure_clean(&self.repo)?;

        let branch = upstream_ref.unwrap_or(&self.config.branch);
        let upstream = helpers::fetch_upstream(&self.repo, &self.config.url, branch)?;
        let previous = match &state {
            Some(state) => Some(state.revision_oid()?),
            None => None,
        };

        if previous == Some(upstream) {
            tracing::info!(revision = %upstream, "Library already up to date");
            return Ok(SyncResult::UpToDate {
                revision: upstream.to_string(),
            });
        }

        let head = helpers::head_commit(&self.repo)?;
        let upstream_commit = self.repo.find_commit(upstream)?;

        let ancestor = match previous {
            Some(rev) => helpers::strip_marker(&self.repo, self.repo.find_commit(rev)?.tree_id())?,
            None => helpers::empty_tree(&self.repo)?,
        };
        let ours = match &head {
            Some(head) => helpers::library_tree(&self.repo, head, &self.prefix)?,
            None => helpers::empty_tree(&self.repo)?,
        };
        let theirs = helpers::strip_marker(&self.repo, upstream_commit.tree_id())?;

        let mut merge_opts = MergeOptions::new();
        merge_opts.find_renames(true);
        let mut index = self.repo.merge_trees(
            &self.repo.find_tree(ancestor)?,
            &self.repo.find_tree(ours)?,
            &self.repo.find_tree(theirs)?,
            Some(&merge_opts),
        )?;

        let message = subtree_message(
            &format!(
                "Merge upstream library {} into {}",
                &upstream.to_string()[..7],
                self.prefix
            ),
            &self.prefix,
            upstream,
        );

        let mut new_state = SyncState::new(&self.config.url, branch, upstream);

        if index.has_conflicts() {
            let conflicted = self.write_conflicted_merge(&mut index, ours)?;
            new_state.revision = previous
                .map(|p| p.to_string())
                .unwrap_or_else(|| upstream.to_string());
            new_state.pending_revision = Some(upstream.to_string());
            new_state.conflicts = conflicted.clone();
            new_state.save(&self.library_dir())?;
            helpers::write_merge_state(&self.repo, upstream, &message)?;

            tracing::warn!(
                revision = %upstream,
                conflicts = conflicted.len(),
                "Library pull left conflicts for manual resolution"
            );
            return Ok(SyncResult::PartialWithConflicts {
                revision: upstream.to_string(),
                conflicted,
            });
        }

        let merged = index.write_tree_to(&self.repo)?;
        let changed = self.changed_paths(ours, merged)?;
        let library = helpers::with_marker(&self.repo, merged, &new_state.to_toml()?)?;

        let head_tree = head.as_ref().map(|h| h.tree()).transpose()?;
        let root_tree = helpers::replace_subtree(&self.repo, head_tree.as_ref(), &self.prefix, Some(library))?;

        let sig = helpers::signature(&self.repo)?;
        let tree = self.repo.find_tree(root_tree)?;
        let mut parents = Vec::with_capacity(2);
        if let Some(head) = &head {
            parents.push(head);
        }
        parents.push(&upstream_commit);
        let commit = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;

        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;

        tracing::info!(
            revision = %upstream,
            %commit,
            changed = changed.len(),
            "Library pulled"
        );
        Ok(SyncResult::Clean {
            revision: upstream.to_string(),
            previous: previous.map(|p| p.to_string()),
            changed,
        })
    }

    /// Project-relative paths whose content differs between two library trees.
    fn changed_paths(&self, before: Oid, after: Oid) -> Result<Vec<String>> {
        let before = self.repo.find_tree(before)?;
        let after = self.repo.find_tree(after)?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&before), Some(&after), None)?;

        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
            .map(|p| format!("{}/{}", self.prefix, p.to_string_lossy().replace('\\', "/")))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Write a conflicted merge index into the working tree.
    ///
    /// Cleanly merged files are written as merged, conflicting files get
    /// conflict markers, and files the merge dropped are deleted.
    /// Returns the project-relative conflicted paths.
    fn write_conflicted_merge(&self, index: &mut git2::Index, ours: Oid) -> Result<Vec<String>> {
        let library_dir = self.library_dir();
        let mut present = std::collections::BTreeSet::new();

        for entry in index.iter() {
            let stage = (entry.flags >> 12) & 0x3;
            let path = String::from_utf8_lossy(&entry.path).to_string();
            present.insert(path.clone());
            if stage != 0 {
                continue;
            }
            let blob = self.repo.find_blob(entry.id)?;
            io::write_atomic(&library_dir.join(&path), blob.content())?;
        }

        let mut conflicted = Vec::new();
        let mut merge_file_opts = MergeFileOptions::new();
        merge_file_opts
            .ancestor_label("base")
            .our_label("local")
            .their_label("upstream")
            .style_diff3(true);

        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            let Some(entry) = entry else { continue };
            let path = String::from_utf8_lossy(&entry.path).to_string();

            let content = match (&conflict.ancestor, &conflict.our, &conflict.their) {
                (Some(base), Some(our), Some(their)) => self
                    .repo
                    .merge_file_from_index(base, our, their, Some(&mut merge_file_opts))?
                    .content()
                    .to_vec(),
                (_, Some(our), Some(their)) => {
                    let our_blob = self.repo.find_blob(our.id)?;
                    let their_blob = self.repo.find_blob(their.id)?;
                    add_add_markers(our_blob.content(), their_blob.content())
                }
                (_, Some(only), None) | (_, None, Some(only)) => {
                    self.repo.find_blob(only.id)?.content().to_vec()
                }
                (_, None, None) => continue,
            };

            io::write_atomic(&library_dir.join(&path), &content)?;
            conflicted.push(format!("{}/{}", self.prefix, path));
        }

        for path in helpers::blob_paths(&self.repo, ours)? {
            if !present.contains(&path) {
                io::remove_file_if_exists(&library_dir.join(&path))?;
            }
        }

        conflicted.sort();
        conflicted.dedup();
        Ok(conflicted)
    }

    /// Record a pull whose conflicts were resolved in the working tree.
    ///
    /// Fails with [`Error::ConflictsPresent`] while any recorded file still
    /// holds conflict markers.
    pub fn complete_pull(&self) -> Result<SyncResult> {
        let state = self.require_state()?;
        let Some(pending) = state.pending_oid()? else {
            return Ok(SyncResult::UpToDate {
                revision: state.revision.clone(),
            });
        };

        let unresolved: Vec<String> = state
            .conflicts
            .iter()
            .filter(|path| {
                io::read_text_optional(&self.root.join(path))
                    .ok()
                    .flatten()
                    .is_some_and(|text| has_conflict_markers(&text))
            })
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(Error::ConflictsPresent { paths: unresolved });
        }

        let mut resolved = SyncState::new(&state.upstream_url, &state.upstream_ref, pending);
        resolved.synced_at = chrono::Utc::now();
        resolved.save(&self.library_dir())?;

        let mut index = self.repo.index()?;
        index.add_all([self.prefix.as_str()], IndexAddOption::DEFAULT, None)?;
        index.update_all([self.prefix.as_str()], None)?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let message = helpers::read_merge_message(&self.repo)?.unwrap_or_else(|| {
            subtree_message(
                &format!("Merge upstream library into {}", self.prefix),
                &self.prefix,
                pending,
            )
        });

        let sig = helpers::signature(&self.repo)?;
        let upstream_commit = self.repo.find_commit(pending)?;
        let head = helpers::head_commit(&self.repo)?;
        let mut parents = Vec::with_capacity(2);
        if let Some(head) = &head {
            parents.push(head);
        }
        parents.push(&upstream_commit);
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;
        self.repo.cleanup_state()?;

        tracing::info!(revision = %pending, "Library pull completed after conflict resolution");
        Ok(SyncResult::Clean {
            revision: pending.to_string(),
            previous: Some(state.revision),
            changed: state.conflicts,
        })
    }

    /// Discard a conflicted pull and restore the last committed library.
    pub fn abort_pull(&self) -> Result<()> {
        let state = self.require_state()?;
        if !state.is_pending() {
            return Ok(());
        }

        for path in helpers::untracked_under(&self.repo, &self.prefix)? {
            let native = self.root.join(&path).to_native();
            if native.is_file() {
                fs::remove_file(&native).map_err(|e| ddx_fs::Error::io(&native, e))?;
            }
        }

        if let Some(head) = helpers::head_commit(&self.repo)? {
            self.repo.reset(head.as_object(), ResetType::Hard, None)?;
        }
        self.repo.cleanup_state()?;
        tracing::info!(prefix = %self.prefix, "Library pull aborted");
        Ok(())
    }

    /// Current relationship between the vendored library and upstream,
    /// without touching the network.
    pub fn status(&self) -> Result<SyncStatus> {
        let state = self.state()?;
        let local_changes = match (&state, helpers::head_commit(&self.repo)?) {
            (Some(state), Some(head)) => match self.repo.find_commit(state.revision_oid()?) {
                Ok(upstream) => {
                    helpers::library_tree(&self.repo, &head, &self.prefix)?
                        != helpers::strip_marker(&self.repo, upstream.tree_id())?
                }
                Err(_) => false,
            },
            _ => false,
        };

        Ok(SyncStatus {
            pending: state.as_ref().is_some_and(SyncState::is_pending),
            state,
            local_changes,
        })
    }

    /// Number of upstream commits not yet pulled.
    pub fn behind(&self) -> Result<usize> {
        let state = self.require_state()?;
        let upstream = helpers::fetch_upstream(&self.repo, &self.config.url, &state.upstream_ref)?;
        let (behind, _) = self
            .repo
            .graph_ahead_behind(upstream, state.revision_oid()?)?;
        Ok(behind)
    }
}

/// Whether `text` still contains an unresolved conflict hunk.
pub fn has_conflict_markers(text: &str) -> bool {
    text.lines().any(|line| line.starts_with("<<<<<<< "))
        && text.lines().any(|line| line.starts_with(">>>>>>> "))
}

fn add_add_markers(ours: &[u8], theirs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ours.len() + theirs.len() + 48);
    out.extend_from_slice(b"<<<<<<< local\n");
    out.extend_from_slice(ours);
    if !ours.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b"=======\n");
    out.extend_from_slice(theirs);
    if !theirs.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b">>>>>>> upstream\n");
    out
}
