//! Shared git2 helper functions for subtree operations
//!
//! Trees handed to these helpers are addressed relative to the project
//! root; `prefix` is always a cleaned, forward-slash relative path.

use std::path::Path;

use ddx_fs::constants::SYNC_MARKER;
use git2::{
    ErrorCode, FetchOptions, ObjectType, Oid, Repository, Signature, Status, StatusOptions, Tree,
};

use crate::{Error, Result};

/// Local ref that receives the fetched upstream tip.
pub const UPSTREAM_REF: &str = "refs/ddx/upstream";

/// Local ref pointing at the last contribution prepared for push.
pub const CONTRIB_REF: &str = "refs/ddx/contrib";

const TREE_MODE: i32 = 0o040000;
const BLOB_MODE: i32 = 0o100644;

/// Signature for commits created by the synchronizer.
///
/// Uses the repository's configured identity and falls back to a fixed
/// one so that pulls work in freshly initialized repositories.
pub fn signature(repo: &Repository) -> Result<Signature<'static>> {
    match repo.signature() {
        Ok(sig) => Ok(sig.to_owned()),
        Err(_) => Ok(Signature::now("ddx", "ddx@localhost")?),
    }
}

/// Paths with uncommitted changes, including untracked files.
pub fn dirty_paths(repo: &Repository) -> Result<Vec<String>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut paths: Vec<String> = statuses
        .iter()
        .filter(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored())
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Fail with [`Error::DirtyWorkingTree`] unless the working tree is clean.
pub fn ensure_clean(repo: &Repository) -> Result<()> {
    let paths = dirty_paths(repo)?;
    if paths.is_empty() {
        Ok(())
    } else {
        Err(Error::DirtyWorkingTree { paths })
    }
}

/// Untracked files below `prefix`.
pub fn untracked_under(repo: &Repository, prefix: &str) -> Result<Vec<String>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .pathspec(prefix);

    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses
        .iter()
        .filter(|entry| entry.status().contains(Status::WT_NEW))
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect())
}

/// Fetch `branch` from `url` into [`UPSTREAM_REF`] and return its tip.
pub fn fetch_upstream(repo: &Repository, url: &str, branch: &str) -> Result<Oid> {
    // A stale tip from an earlier fetch must not mask a missing branch.
    if let Ok(mut stale) = repo.find_reference(UPSTREAM_REF) {
        stale.delete()?;
    }

    let mut remote = repo.remote_anonymous(url)?;
    let refspec = format!("+refs/heads/{branch}:{UPSTREAM_REF}");

    tracing::debug!(%url, %branch, "Fetching upstream library");
    let mut opts = FetchOptions::new();
    remote
        .fetch(&[refspec.as_str()], Some(&mut opts), None)
        .map_err(|e| match e.code() {
            ErrorCode::NotFound => Error::UpstreamRefNotFound {
                url: url.to_string(),
                branch: branch.to_string(),
            },
            _ => Error::Fetch {
                url: url.to_string(),
                message: e.message().to_string(),
            },
        })?;

    repo.refname_to_id(UPSTREAM_REF)
        .map_err(|_| Error::UpstreamRefNotFound {
            url: url.to_string(),
            branch: branch.to_string(),
        })
}

/// HEAD's commit, or `None` on an unborn branch.
pub fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Oid of the empty tree.
pub fn empty_tree(repo: &Repository) -> Result<Oid> {
    Ok(repo.treebuilder(None)?.write()?)
}

/// Tree stored at `prefix` inside `root`, if any.
pub fn subtree_at(root: &Tree<'_>, prefix: &str) -> Result<Option<Oid>> {
    match root.get_path(Path::new(prefix)) {
        Ok(entry) if entry.kind() == Some(ObjectType::Tree) => Ok(Some(entry.id())),
        Ok(_) => Ok(None),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The library tree without its sync marker.
pub fn strip_marker(repo: &Repository, tree: Oid) -> Result<Oid> {
    let tree = repo.find_tree(tree)?;
    if tree.get_name(SYNC_MARKER).is_none() {
        return Ok(tree.id());
    }
    let mut builder = repo.treebuilder(Some(&tree))?;
    builder.remove(SYNC_MARKER)?;
    Ok(builder.write()?)
}

/// The library tree with `marker` stored as its sync marker.
pub fn with_marker(repo: &Repository, tree: Oid, marker: &str) -> Result<Oid> {
    let tree = repo.find_tree(tree)?;
    let blob = repo.blob(marker.as_bytes())?;
    let mut builder = repo.treebuilder(Some(&tree))?;
    builder.insert(SYNC_MARKER, blob, BLOB_MODE)?;
    Ok(builder.write()?)
}

/// Library tree (marker stripped) of a project commit, or the empty tree.
pub fn library_tree(repo: &Repository, commit: &git2::Commit<'_>, prefix: &str) -> Result<Oid> {
    match subtree_at(&commit.tree()?, prefix)? {
        Some(oid) => strip_marker(repo, oid),
        None => empty_tree(repo),
    }
}

/// Return `root` with the tree at `prefix` replaced by `subtree`
/// (or removed when `subtree` is `None`). Intermediate directories are
/// created or pruned as needed.
pub fn replace_subtree(
    repo: &Repository,
    root: Option<&Tree<'_>>,
    prefix: &str,
    subtree: Option<Oid>,
) -> Result<Oid> {
    let components: Vec<&str> = prefix.split('/').filter(|c| !c.is_empty()).collect();
    match replace_path(repo, root, &components, subtree)? {
        Some(oid) => Ok(oid),
        None => empty_tree(repo),
    }
}

fn replace_path(
    repo: &Repository,
    node: Option<&Tree<'_>>,
    components: &[&str],
    replacement: Option<Oid>,
) -> Result<Option<Oid>> {
    let Some((&first, rest)) = components.split_first() else {
        return Ok(replacement);
    };

    let mut builder = repo.treebuilder(node)?;
    let existing = builder.get(first)?.map(|entry| (entry.id(), entry.kind()));

    let child = if rest.is_empty() {
        replacement
    } else {
        let child_tree = match existing {
            Some((id, Some(ObjectType::Tree))) => Some(repo.find_tree(id)?),
            _ => None,
        };
        replace_path(repo, child_tree.as_ref(), rest, replacement)?
    };

    match child {
        Some(oid) => {
            builder.insert(first, oid, TREE_MODE)?;
        }
        None if existing.is_some() => builder.remove(first)?,
        None => {}
    }

    if builder.len() == 0 {
        return Ok(None);
    }
    Ok(Some(builder.write()?))
}

/// Every blob path below `tree`, relative to it, sorted.
pub fn blob_paths(repo: &Repository, tree: Oid) -> Result<Vec<String>> {
    let tree = repo.find_tree(tree)?;
    let mut paths = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(ObjectType::Blob)
            && let Some(name) = entry.name()
        {
            paths.push(format!("{dir}{name}"));
        }
        git2::TreeWalkResult::Ok
    })?;
    paths.sort();
    Ok(paths)
}

/// Write `MERGE_HEAD` and `MERGE_MSG` so a plain `git commit` records
/// `upstream` as the second parent.
pub fn write_merge_state(repo: &Repository, upstream: Oid, message: &str) -> Result<()> {
    let git_dir = repo.path();
    ddx_fs::io::write_text(
        &ddx_fs::NormalizedPath::new(git_dir.join("MERGE_HEAD")),
        &format!("{upstream}\n"),
    )?;
    ddx_fs::io::write_text(
        &ddx_fs::NormalizedPath::new(git_dir.join("MERGE_MSG")),
        message,
    )?;
    Ok(())
}

/// Message of a pending merge, if one was recorded.
pub fn read_merge_message(repo: &Repository) -> Result<Option<String>> {
    Ok(ddx_fs::io::read_text_optional(&ddx_fs::NormalizedPath::new(
        repo.path().join("MERGE_MSG"),
    ))?)
}

/// Commit message for a subtree synchronization point.
pub fn subtree_message(summary: &str, prefix: &str, upstream: Oid) -> String {
    format!("{summary}\n\ngit-subtree-dir: {prefix}\ngit-subtree-split: {upstream}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn blob_tree(repo: &Repository, name: &str, content: &str) -> Oid {
        let blob = repo.blob(content.as_bytes()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert(name, blob, BLOB_MODE).unwrap();
        builder.write().unwrap()
    }

    #[test]
    fn replace_subtree_creates_and_prunes_directories() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let lib = blob_tree(&repo, "a.md", "A");

        let root = replace_subtree(&repo, None, ".ddx/library", Some(lib)).unwrap();
        let root_tree = repo.find_tree(root).unwrap();
        assert_eq!(subtree_at(&root_tree, ".ddx/library").unwrap(), Some(lib));
        assert_eq!(
            blob_paths(&repo, root).unwrap(),
            vec![".ddx/library/a.md".to_string()]
        );

        let pruned = replace_subtree(&repo, Some(&root_tree), ".ddx/library", None).unwrap();
        assert_eq!(pruned, empty_tree(&repo).unwrap());
    }

    #[test]
    fn marker_is_stripped() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let lib = blob_tree(&repo, "a.md", "A");

        let marked = with_marker(&repo, lib, "revision = \"x\"").unwrap();
        assert_ne!(marked, lib);
        assert_eq!(strip_marker(&repo, marked).unwrap(), lib);
    }
}
