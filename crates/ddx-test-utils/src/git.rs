//! Git fixtures built with `git2` only, so tests never need a `git` binary.
//!
//! Two kinds of repository show up in DDx tests:
//!
//! - **Project repositories**: a working tree with `main` checked out and
//!   a configured identity.
//! - **Upstream libraries**: bare repositories whose `main` branch is
//!   written directly from in-memory file maps.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use git2::{IndexAddOption, ObjectType, Oid, Repository, Signature};

const BLOB_MODE: i32 = 0o100644;
const TREE_MODE: i32 = 0o040000;

/// Fixed identity used for fixture commits.
pub fn test_signature() -> Signature<'static> {
    Signature::now("Test User", "test@test.com")
        .unwrap_or_else(|e| panic!("test_signature: {e}"))
}

/// Initialises a project repository with `main` as the unborn HEAD and
/// a local identity configured.
///
/// # Panics
/// Panics if any git operation fails.
pub fn real_git_repo(path: &Path) -> Repository {
    let repo = Repository::init(path).unwrap_or_else(|e| {
        panic!(
            "real_git_repo: failed to init repository at {}: {e}",
            path.display()
        )
    });
    repo.set_head("refs/heads/main")
        .unwrap_or_else(|e| panic!("real_git_repo: failed to point HEAD at main: {e}"));
    {
        let mut config = repo
            .config()
            .unwrap_or_else(|e| panic!("real_git_repo: failed to open config: {e}"));
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        config.set_bool("commit.gpgsign", false).unwrap();
    }
    repo
}

/// Initialises a project repository with a README committed on `main`.
///
/// # Panics
/// Panics if any git operation fails.
pub fn real_git_repo_with_commit(path: &Path) -> Repository {
    let repo = real_git_repo(path);
    fs::write(path.join("README.md"), "# Test\n")
        .unwrap_or_else(|e| panic!("real_git_repo_with_commit: failed to write README.md: {e}"));
    commit_all(&repo, "Initial commit");
    repo
}

/// Stage every change in the working tree (including deletions) and
/// commit it on HEAD.
///
/// # Panics
/// Panics if any git operation fails.
pub fn commit_all(repo: &Repository, message: &str) -> Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"], IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("commit_all: add_all failed: {e}"));
    index.update_all(["*"], None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let sig = test_signature();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_all: commit failed: {e}"))
}

/// Creates a bare upstream library repository whose `main` branch holds
/// `files` in a single commit.
///
/// # Panics
/// Panics if any git operation fails.
pub fn bare_library(path: &Path, files: &[(&str, &str)]) -> Repository {
    let repo = Repository::init_bare(path).unwrap_or_else(|e| {
        panic!(
            "bare_library: failed to init bare repository at {}: {e}",
            path.display()
        )
    });
    repo.set_head("refs/heads/main").unwrap();
    let changes: Vec<(&str, Option<&str>)> = files.iter().map(|(p, c)| (*p, Some(*c))).collect();
    commit_files(&repo, "main", &changes, "Initial library");
    repo
}

/// Commits `changes` on top of `branch` in any repository without
/// touching a working tree. `None` deletes a file.
///
/// # Panics
/// Panics if any git operation fails.
pub fn commit_files(
    repo: &Repository,
    branch: &str,
    changes: &[(&str, Option<&str>)],
    message: &str,
) -> Oid {
    let refname = format!("refs/heads/{branch}");
    let parent = repo
        .find_reference(&refname)
        .ok()
        .and_then(|r| r.peel_to_commit().ok());

    let mut files = match &parent {
        Some(commit) => flatten_tree(repo, &commit.tree().unwrap()),
        None => BTreeMap::new(),
    };
    for (path, content) in changes {
        match content {
            Some(content) => {
                files.insert(path.to_string(), content.as_bytes().to_vec());
            }
            None => {
                files.remove(*path);
            }
        }
    }

    let tree = repo.find_tree(build_tree(repo, &files)).unwrap();
    let sig = test_signature();
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_files: commit on {branch} failed: {e}"))
}

/// Write a (possibly nested) tree from a map of slash-separated paths.
pub fn build_tree(repo: &Repository, files: &BTreeMap<String, Vec<u8>>) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let mut dirs: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();

    for (path, content) in files {
        match path.split_once('/') {
            Some((dir, rest)) => {
                dirs.entry(dir.to_string())
                    .or_default()
                    .insert(rest.to_string(), content.clone());
            }
            None => {
                let blob = repo.blob(content).unwrap();
                builder.insert(path.as_str(), blob, BLOB_MODE).unwrap();
            }
        }
    }
    for (dir, children) in &dirs {
        let child = build_tree(repo, children);
        builder.insert(dir.as_str(), child, TREE_MODE).unwrap();
    }
    builder.write().unwrap()
}

/// Every blob below `tree`, keyed by slash-separated path.
pub fn flatten_tree(repo: &Repository, tree: &git2::Tree<'_>) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            let blob = repo.find_blob(entry.id()).unwrap();
            files.insert(
                format!("{dir}{}", entry.name().unwrap_or_default()),
                blob.content().to_vec(),
            );
        }
        git2::TreeWalkResult::Ok
    })
    .unwrap();
    files
}

/// Content of `path` at the tip of `branch`, if present.
pub fn read_file(repo: &Repository, branch: &str, path: &str) -> Option<String> {
    let commit = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .ok()?
        .peel_to_commit()
        .ok()?;
    let entry = commit.tree().ok()?.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(String::from_utf8_lossy(blob.content()).to_string())
}

/// Tip of `branch`.
///
/// # Panics
/// Panics if the branch does not exist.
pub fn branch_tip(repo: &Repository, branch: &str) -> Oid {
    repo.refname_to_id(&format!("refs/heads/{branch}"))
        .unwrap_or_else(|e| panic!("branch_tip: no branch {branch}: {e}"))
}
