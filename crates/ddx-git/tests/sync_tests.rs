//! Pull and push of the vendored library against a local bare upstream.

use std::fs;

use ddx_git::{Error, PushMode, PushOptions, SyncConfig, SyncResult, Synchronizer};
use ddx_test_utils::git::{
    bare_library, branch_tip, commit_all, commit_files, read_file, real_git_repo_with_commit,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

const PREFIX: &str = ".ddx/library";

struct Fixture {
    _upstream_dir: TempDir,
    project_dir: TempDir,
    upstream: git2::Repository,
    project: git2::Repository,
    config: SyncConfig,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let upstream_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        let upstream = bare_library(upstream_dir.path(), files);
        let project = real_git_repo_with_commit(project_dir.path());
        let config = SyncConfig {
            url: upstream_dir.path().to_string_lossy().to_string(),
            branch: "main".into(),
            prefix: PREFIX.into(),
        };
        Self {
            _upstream_dir: upstream_dir,
            project_dir,
            upstream,
            project,
            config,
        }
    }

    fn sync(&self) -> Synchronizer {
        Synchronizer::open(self.project_dir.path(), self.config.clone()).unwrap()
    }

    fn lib_path(&self, file: &str) -> std::path::PathBuf {
        self.project_dir.path().join(PREFIX).join(file)
    }

    fn read_lib(&self, file: &str) -> String {
        fs::read_to_string(self.lib_path(file)).unwrap()
    }

    fn edit_lib(&self, file: &str, content: &str) {
        let path = self.lib_path(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

#[test]
fn test_first_pull_imports_library() {
    let fx = Fixture::new(&[("templates/readme/README.md", "# {{project_name}}\n")]);
    let tip = branch_tip(&fx.upstream, "main");

    let result = fx.sync().pull(None).unwrap();

    match result {
        SyncResult::Clean {
            revision,
            previous,
            changed,
        } => {
            assert_eq!(revision, tip.to_string());
            assert_eq!(previous, None);
            assert_eq!(changed, vec![format!("{PREFIX}/templates/readme/README.md")]);
        }
        other => panic!("expected clean pull, got {other:?}"),
    }
    assert_eq!(fx.read_lib("templates/readme/README.md"), "# {{project_name}}\n");

    let head = fx.project.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_count(), 2);
    assert_eq!(head.parent_id(1).unwrap(), tip);
    assert!(
        head.message()
            .unwrap()
            .contains(&format!("git-subtree-split: {tip}"))
    );

    let state = fx.sync().state().unwrap().unwrap();
    assert_eq!(state.revision, tip.to_string());
    assert!(!state.is_pending());
}

#[test]
fn test_second_pull_is_up_to_date() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();

    let result = fx.sync().pull(None).unwrap();

    assert!(matches!(result, SyncResult::UpToDate { .. }));
    assert!(!result.files_changed());
}

#[test]
fn test_pull_preserves_non_overlapping_local_edits() {
    let fx = Fixture::new(&[("a.md", "A\n"), ("b.md", "B\n")]);
    fx.sync().pull(None).unwrap();

    fx.edit_lib("a.md", "A local\n");
    commit_all(&fx.project, "Tweak a.md");
    commit_files(&fx.upstream, "main", &[("b.md", Some("B upstream\n")), ("c.md", Some("C\n"))], "Upstream");

    let result = fx.sync().pull(None).unwrap();

    assert!(matches!(result, SyncResult::Clean { .. }), "{result:?}");
    assert_eq!(fx.read_lib("a.md"), "A local\n");
    assert_eq!(fx.read_lib("b.md"), "B upstream\n");
    assert_eq!(fx.read_lib("c.md"), "C\n");
    assert!(fx.sync().status().unwrap().local_changes);
}

#[test]
fn test_upstream_deletion_removes_file() {
    let fx = Fixture::new(&[("a.md", "A\n"), ("old.md", "old\n")]);
    fx.sync().pull(None).unwrap();
    commit_files(&fx.upstream, "main", &[("old.md", None)], "Drop old");

    fx.sync().pull(None).unwrap();

    assert!(!fx.lib_path("old.md").exists());
    assert!(fx.lib_path("a.md").exists());
}

#[test]
fn test_overlapping_edits_leave_conflict_markers() {
    let fx = Fixture::new(&[("guide.md", "one\ntwo\nthree\n")]);
    fx.sync().pull(None).unwrap();

    fx.edit_lib("guide.md", "one\nlocal two\nthree\n");
    commit_all(&fx.project, "Local guide edit");
    let upstream_tip = commit_files(
        &fx.upstream,
        "main",
        &[("guide.md", Some("one\nupstream two\nthree\n"))],
        "Upstream guide edit",
    );

    let result = fx.sync().pull(None).unwrap();

    let conflicted_path = format!("{PREFIX}/guide.md");
    assert_eq!(
        result,
        SyncResult::PartialWithConflicts {
            revision: upstream_tip.to_string(),
            conflicted: vec![conflicted_path.clone()],
        }
    );
    let content = fx.read_lib("guide.md");
    assert!(content.contains("<<<<<<< local"));
    assert!(content.contains("local two"));
    assert!(content.contains("upstream two"));
    assert!(content.contains(">>>>>>> upstream"));
    assert!(fx.project.path().join("MERGE_HEAD").exists());

    // A second pull refuses until the conflict is resolved.
    match fx.sync().pull(None) {
        Err(Error::ConflictsPresent { paths }) => assert_eq!(paths, vec![conflicted_path]),
        other => panic!("expected ConflictsPresent, got {other:?}"),
    }

    // Completing with markers still present is refused too.
    assert!(matches!(
        fx.sync().complete_pull(),
        Err(Error::ConflictsPresent { .. })
    ));

    fx.edit_lib("guide.md", "one\nmerged two\nthree\n");
    let completed = fx.sync().complete_pull().unwrap();
    assert!(matches!(completed, SyncResult::Clean { .. }));

    let head = fx.project.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_id(1).unwrap(), upstream_tip);
    let status = fx.sync().status().unwrap();
    assert!(!status.pending);
    assert_eq!(status.state.unwrap().revision, upstream_tip.to_string());
    assert!(!fx.project.path().join("MERGE_HEAD").exists());
    assert!(matches!(fx.sync().pull(None).unwrap(), SyncResult::UpToDate { .. }));
}

#[test]
fn test_abort_pull_restores_committed_library() {
    let fx = Fixture::new(&[("guide.md", "one\n")]);
    fx.sync().pull(None).unwrap();
    fx.edit_lib("guide.md", "local\n");
    commit_all(&fx.project, "Local");
    commit_files(
        &fx.upstream,
        "main",
        &[("guide.md", Some("upstream\n")), ("new.md", Some("new\n"))],
        "Upstream",
    );

    let result = fx.sync().pull(None).unwrap();
    assert!(matches!(result, SyncResult::PartialWithConflicts { .. }));

    fx.sync().abort_pull().unwrap();

    assert_eq!(fx.read_lib("guide.md"), "local\n");
    assert!(!fx.lib_path("new.md").exists());
    assert!(!fx.sync().status().unwrap().pending);
}

#[test]
fn test_dirty_tree_blocks_pull() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fs::write(fx.project_dir.path().join("scratch.txt"), "wip").unwrap();

    match fx.sync().pull(None) {
        Err(Error::DirtyWorkingTree { paths }) => assert_eq!(paths, vec!["scratch.txt".to_string()]),
        other => panic!("expected DirtyWorkingTree, got {other:?}"),
    }
    assert!(!fx.lib_path("a.md").exists());
}

#[test]
fn test_missing_upstream_branch() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    assert!(matches!(
        fx.sync().pull(Some("does-not-exist")),
        Err(Error::UpstreamRefNotFound { .. })
    ));
}

#[test]
fn test_prefix_outside_project_is_rejected() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    let mut config = fx.config.clone();
    config.prefix = "../elsewhere".into();
    assert!(matches!(
        Synchronizer::open(fx.project_dir.path(), config),
        Err(Error::InvalidPrefix { .. })
    ));
}

#[test]
fn test_push_publishes_local_history() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();

    fx.edit_lib("a.md", "A improved\n");
    commit_all(&fx.project, "Improve a.md");
    fs::write(fx.project_dir.path().join("unrelated.txt"), "x").unwrap();
    commit_all(&fx.project, "Unrelated project change");
    fx.edit_lib("b.md", "B\n");
    commit_all(&fx.project, "Add b.md");

    let result = fx.sync().push(&PushOptions::default()).unwrap();

    let SyncResult::Pushed {
        revision,
        target,
        commits,
    } = result
    else {
        panic!("expected push");
    };
    assert_eq!(target, "main");
    let summaries: Vec<_> = commits.iter().map(|c| c.summary.as_str()).collect();
    assert_eq!(summaries, vec!["Improve a.md", "Add b.md"]);
    assert_eq!(branch_tip(&fx.upstream, "main").to_string(), revision);
    assert_eq!(read_file(&fx.upstream, "main", "a.md").unwrap(), "A improved\n");
    assert_eq!(read_file(&fx.upstream, "main", "b.md").unwrap(), "B\n");
    assert!(read_file(&fx.upstream, "main", ".ddx-sync").is_none());
    assert!(read_file(&fx.upstream, "main", "unrelated.txt").is_none());

    assert_eq!(fx.sync().state().unwrap().unwrap().revision, revision);
    assert!(matches!(fx.sync().pull(None).unwrap(), SyncResult::UpToDate { .. }));
}

#[rstest]
fn test_push_without_changes_is_up_to_date(
    #[values(PushMode::History, PushMode::Squash)] mode: PushMode,
) {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();
    let before = branch_tip(&fx.upstream, "main");

    let options = PushOptions {
        mode,
        ..PushOptions::default()
    };
    let result = fx.sync().push(&options).unwrap();

    assert!(matches!(result, SyncResult::UpToDate { .. }));
    assert_eq!(branch_tip(&fx.upstream, "main"), before);
}

#[test]
fn test_push_after_upstream_advanced_is_stale() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();
    let pulled = fx.sync().state().unwrap().unwrap().revision;

    fx.edit_lib("a.md", "A local\n");
    commit_all(&fx.project, "Local");
    let advanced = commit_files(&fx.upstream, "main", &[("z.md", Some("Z\n"))], "Upstream moved");

    match fx.sync().push(&PushOptions::default()) {
        Err(Error::StaleBase { base, upstream }) => {
            assert_eq!(base, pulled);
            assert_eq!(upstream, advanced.to_string());
        }
        other => panic!("expected StaleBase, got {other:?}"),
    }
    assert_eq!(branch_tip(&fx.upstream, "main"), advanced);
    assert_eq!(fx.sync().behind().unwrap(), 1);
}

#[test]
fn test_squash_push_to_contribution_branch() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();
    let base = fx.sync().state().unwrap().unwrap().revision;

    fx.edit_lib("a.md", "A1\n");
    commit_all(&fx.project, "First");
    fx.edit_lib("a.md", "A2\n");
    commit_all(&fx.project, "Second");

    let options = PushOptions {
        mode: PushMode::Squash,
        target_branch: Some("contrib/a".into()),
        message: Some("Improve a.md".into()),
    };
    let result = fx.sync().push(&options).unwrap();

    assert!(matches!(result, SyncResult::Pushed { ref commits, .. } if commits.len() == 1));
    let tip = fx
        .upstream
        .find_commit(branch_tip(&fx.upstream, "contrib/a"))
        .unwrap();
    assert_eq!(tip.summary(), Some("Improve a.md"));
    assert_eq!(tip.parent_id(0).unwrap().to_string(), base);
    assert_eq!(read_file(&fx.upstream, "contrib/a", "a.md").unwrap(), "A2\n");
    // The tracked branch is untouched, so the recorded revision stays put.
    assert_eq!(fx.sync().state().unwrap().unwrap().revision, base);
}

#[test]
fn test_push_refuses_dirty_tree() {
    let fx = Fixture::new(&[("a.md", "A\n")]);
    fx.sync().pull(None).unwrap();
    fx.edit_lib("a.md", "uncommitted\n");

    assert!(matches!(
        fx.sync().push(&PushOptions::default()),
        Err(Error::DirtyWorkingTree { .. })
    ));
}
