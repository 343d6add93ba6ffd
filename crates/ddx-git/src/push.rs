//! Contributing local library changes back upstream.

use git2::build::CheckoutBuilder;
use git2::{Oid, PushOptions as GitPushOptions, RemoteCallbacks};

use crate::commits::{CommitInfo, library_changes_since};
use crate::helpers::{self, CONTRIB_REF, subtree_message};
use crate::state::SyncState;
use crate::sync::{SyncResult, Synchronizer};
use crate::{Error, Result};

/// How local history is turned into upstream commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// Replay every project commit that touched the library
    #[default]
    History,
    /// One commit carrying the current library tree
    Squash,
}

/// Options for [`Synchronizer::push`].
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub mode: PushMode,
    /// Upstream branch to publish to; defaults to the tracked branch
    pub target_branch: Option<String>,
    /// Message for [`PushMode::Squash`] commits
    pub message: Option<String>,
}

/// Library commits ready to publish, built on the last synchronized
/// upstream revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Upstream revision the change set is built on
    pub base: String,
    /// Tip of the rewritten history
    pub tip: String,
    /// Project commits that produced it, oldest first (one synthetic
    /// entry in squash mode)
    pub commits: Vec<CommitInfo>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.base == self.tip
    }
}

impl Synchronizer {
    /// Build the change set for the committed library against the last
    /// synchronized upstream revision. Nothing is published.
    pub fn extract(&self, mode: PushMode, message: Option<&str>) -> Result<ChangeSet> {
        let repo = self.repository();
        let state = self.require_state()?;
        let base = state.revision_oid()?;
        let Some(head) = helpers::head_commit(repo)? else {
            return Err(Error::NotVendored {
                prefix: self.prefix().to_string(),
            });
        };

        let base_commit = repo.find_commit(base)?;
        let base_tree = helpers::strip_marker(repo, base_commit.tree_id())?;
        let current = helpers::library_tree(repo, &head, self.prefix())?;

        if current == base_tree {
            return Ok(ChangeSet {
                base: base.to_string(),
                tip: base.to_string(),
                commits: Vec::new(),
            });
        }

        let (tip, commits) = match mode {
            PushMode::Squash => {
                let sig = helpers::signature(repo)?;
                let message = message.unwrap_or("Contribute local library changes");
                let tree = repo.find_tree(current)?;
                let tip = repo.commit(None, &sig, &sig, message, &tree, &[&base_commit])?;
                let info = CommitInfo::from_commit(&repo.find_commit(tip)?);
                (tip, vec![info])
            }
            PushMode::History => {
                let changes = library_changes_since(repo, &head, base, self.prefix())?;
                let mut parent = base_commit.clone();
                let mut infos = Vec::with_capacity(changes.len());
                for commit in &changes {
                    let tree_id = helpers::library_tree(repo, commit, self.prefix())?;
                    let tree = repo.find_tree(tree_id)?;
                    let replayed = repo.commit(
                        None,
                        &commit.author(),
                        &commit.committer(),
                        commit.message().unwrap_or(""),
                        &tree,
                        &[&parent],
                    )?;
                    infos.push(CommitInfo::from_commit(commit));
                    parent = repo.find_commit(replayed)?;
                }
                (parent.id(), infos)
            }
        };

        repo.reference(CONTRIB_REF, tip, true, "ddx: prepare library contribution")?;
        tracing::debug!(%base, %tip, commits = commits.len(), "Library change set extracted");

        Ok(ChangeSet {
            base: base.to_string(),
            tip: tip.to_string(),
            commits,
        })
    }

    /// Publish local library changes upstream without rewriting history.
    ///
    /// Fails with [`Error::StaleBase`] when the tracked upstream branch
    /// moved past the last synchronized revision; pull first. When the
    /// target is the tracked branch, the pushed commit becomes the new
    /// synchronized revision.
    pub fn push(&self, options: &PushOptions) -> Result<SyncResult> {
        let repo = self.repository();
        let state = self.require_state()?;
        if state.is_pending() {
            return Err(Error::ConflictsPresent {
                paths: state.conflicts.clone(),
            });
        }
        helpers::ensure_clean(repo)?;

        let upstream = helpers::fetch_upstream(repo, &self.config().url, &state.upstream_ref)?;
        let base = state.revision_oid()?;
        if upstream != base {
            return Err(Error::StaleBase {
                base: base.to_string(),
                upstream: upstream.to_string(),
            });
        }

        let change_set = self.extract(options.mode, options.message.as_deref())?;
        if change_set.is_empty() {
            tracing::info!(revision = %base, "No library changes to contribute");
            return Ok(SyncResult::UpToDate {
                revision: base.to_string(),
            });
        }

        let target = options
            .target_branch
            .clone()
            .unwrap_or_else(|| state.upstream_ref.clone());
        let refspec = format!("{CONTRIB_REF}:refs/heads/{target}");
        self.push_refspec(&refspec)?;

        let tip = Oid::from_str(&change_set.tip)?;
        if target == state.upstream_ref {
            self.record_pushed_revision(&state, tip)?;
        }

        tracing::info!(%target, revision = %tip, commits = change_set.commits.len(), "Library changes pushed");
        Ok(SyncResult::Pushed {
            revision: tip.to_string(),
            target,
            commits: change_set.commits,
        })
    }

    fn push_refspec(&self, refspec: &str) -> Result<()> {
        let mut remote = self.repository().remote_anonymous(&self.config().url)?;

        let mut rejection: Option<String> = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    rejection = Some(message.to_string());
                }
                Ok(())
            });
            let mut opts = GitPushOptions::new();
            opts.remote_callbacks(callbacks);

            remote
                .push(&[refspec], Some(&mut opts))
                .map_err(|e| Error::PushRejected {
                    refspec: refspec.to_string(),
                    message: e.message().to_string(),
                })?;
        }

        match rejection {
            Some(message) => Err(Error::PushRejected {
                refspec: refspec.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// Commit a synchronization point recording `pushed` as the library's
    /// upstream revision.
    fn record_pushed_revision(&self, state: &SyncState, pushed: Oid) -> Result<()> {
        let repo = self.repository();
        let Some(head) = helpers::head_commit(repo)? else {
            return Ok(());
        };
        let pushed_commit = repo.find_commit(pushed)?;

        let mut new_state = SyncState::new(&state.upstream_url, &state.upstream_ref, pushed);
        new_state.synced_at = chrono::Utc::now();
        let library = helpers::with_marker(repo, pushed_commit.tree_id(), &new_state.to_toml()?)?;
        let root = helpers::replace_subtree(repo, Some(&head.tree()?), self.prefix(), Some(library))?;
        let tree = repo.find_tree(root)?;

        let sig = helpers::signature(repo)?;
        let message = subtree_message(
            &format!("Record library contribution {}", &pushed.to_string()[..7]),
            self.prefix(),
            pushed,
        );
        repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&head, &pushed_commit])?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }
}
