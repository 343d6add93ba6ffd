//! End-to-end DDx workflow against a local bare upstream library
//!
//! Exercises the full loop: configure -> pull -> apply -> upstream moves ->
//! update flags a reapply -> reapply -> contribute back.

use std::fs;

use ddx_core::apply::{ApplyOptions, Classification, Strategy};
use ddx_core::config::EnvSnapshot;
use ddx_core::substitute::Bindings;
use ddx_core::{AppliedRecord, Project};
use ddx_fs::NormalizedPath;
use ddx_git::{PushMode, PushOptions, SyncResult};
use ddx_test_utils::git::{bare_library, branch_tip, commit_all, commit_files, read_file};
use ddx_test_utils::project::TestProject;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Workspace {
    _upstream_dir: TempDir,
    upstream: git2::Repository,
    test_project: TestProject,
    repo: git2::Repository,
}

impl Workspace {
    fn new() -> Self {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = bare_library(
            upstream_dir.path(),
            &[
                ("templates/service/docs/OVERVIEW.md", "# {{project_name}}\n"),
                (
                    "templates/service/{{project_name}}.toml",
                    "[service]\nname = \"{{project_name}}\"\nport = {{port || 8080}}\n",
                ),
                ("prompts/claude/base.md", "Keep changes small.\n"),
            ],
        );

        let test_project = TestProject::new();
        let repo = test_project.init_git();
        test_project.write_config(&format!(
            "[repository]\nurl = \"{}\"\nbranch = \"main\"\n\n[variables]\nproject_name = \"acme\"\n",
            upstream_dir.path().display()
        ));
        commit_all(&repo, "Configure ddx");

        Self {
            _upstream_dir: upstream_dir,
            upstream,
            test_project,
            repo,
        }
    }

    fn project(&self) -> Project {
        Project::open(self.test_project.root(), EnvSnapshot::default())
            .with_global_config_dir(self.test_project.global_config_dir())
    }

    fn applied(&self) -> AppliedRecord {
        AppliedRecord::load(&NormalizedPath::new(
            self.test_project.root().join(".ddx/applied.toml"),
        ))
        .unwrap()
    }
}

#[test]
fn test_pull_apply_update_reapply() {
    let ws = Workspace::new();
    let project = ws.project();

    // First pull vendors the library.
    let outcome = project.update(None).unwrap();
    let first = branch_tip(&ws.upstream, "main").to_string();
    assert!(matches!(outcome.sync, SyncResult::Clean { ref revision, .. } if *revision == first));
    assert!(!outcome.reapply_needed);
    ws.test_project
        .assert_file_exists(".ddx/library/templates/service/docs/OVERVIEW.md");

    // Apply records the library revision it rendered from.
    let report = project
        .apply_template("service", &ApplyOptions::default(), &Bindings::new())
        .unwrap();
    assert_eq!(report.written, 2);
    ws.test_project.assert_file_contains("docs/OVERVIEW.md", "# acme");
    ws.test_project.assert_file_contains("acme.toml", "port = 8080");
    assert_eq!(ws.applied().templates["service"].revision, first);
    commit_all(&ws.repo, "Apply service template");

    // Nothing new upstream: no reapply.
    let outcome = project.update(None).unwrap();
    assert!(matches!(outcome.sync, SyncResult::UpToDate { .. }));
    assert!(!outcome.reapply_needed);

    // Upstream moves on.
    commit_files(
        &ws.upstream,
        "main",
        &[("templates/service/docs/OVERVIEW.md", Some("# {{project_name}} v2\n"))],
        "Revise overview",
    );
    let second = branch_tip(&ws.upstream, "main").to_string();

    let outcome = project.update(None).unwrap();
    assert_eq!(outcome.sync.revision(), second);
    assert!(outcome.reapply_needed);
    assert_eq!(outcome.config.variables["project_name"], "acme");

    // Reapplying with the default strategy leaves the local file alone.
    let report = project
        .apply_template("service", &ApplyOptions::default(), &Bindings::new())
        .unwrap();
    assert_eq!(
        report.skipped().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        vec!["docs/OVERVIEW.md"]
    );
    ws.test_project.assert_file_contains("docs/OVERVIEW.md", "# acme\n");

    let report = project
        .apply_template(
            "service",
            &ApplyOptions::with_strategy(Strategy::Overwrite),
            &Bindings::new(),
        )
        .unwrap();
    let overview = report
        .outcomes
        .iter()
        .find(|o| o.path.as_str() == "docs/OVERVIEW.md")
        .unwrap();
    assert_eq!(overview.classification, Classification::Update);
    ws.test_project.assert_file_contains("docs/OVERVIEW.md", "# acme v2");
    assert_eq!(ws.applied().templates["service"].revision, second);
    commit_all(&ws.repo, "Reapply service template");

    let outcome = project.update(None).unwrap();
    assert!(!outcome.reapply_needed);
}

#[test]
fn test_ask_apply_does_not_record_revision() {
    let ws = Workspace::new();
    let project = ws.project();
    project.update(None).unwrap();
    ws.test_project.write_file("docs/OVERVIEW.md", "# local\n");

    let report = project
        .apply_template(
            "service",
            &ApplyOptions::with_strategy(Strategy::Ask),
            &Bindings::new(),
        )
        .unwrap();

    assert!(report.needs_decision());
    ws.test_project.assert_file_not_exists("acme.toml");
    ws.test_project.assert_file_not_exists(".ddx/applied.toml");
}

#[test]
fn test_contribute_library_change_upstream() {
    let ws = Workspace::new();
    let project = ws.project();
    project.update(None).unwrap();

    ws.test_project.write_file(
        ".ddx/library/prompts/claude/review.md",
        "Review every diff.\n",
    );
    ws.test_project.write_file("src/main.rs", "fn main() {}\n");
    commit_all(&ws.repo, "Add review prompt");

    let result = project.contribute(&PushOptions::default()).unwrap();

    let SyncResult::Pushed { commits, target, .. } = result else {
        panic!("expected push, got {result:?}");
    };
    assert_eq!(target, "main");
    assert_eq!(commits.len(), 1);
    assert_eq!(
        read_file(&ws.upstream, "main", "prompts/claude/review.md").as_deref(),
        Some("Review every diff.\n")
    );
    assert_eq!(read_file(&ws.upstream, "main", "src/main.rs"), None);
    assert_eq!(read_file(&ws.upstream, "main", ".ddx-sync"), None);

    // The contribution is now the synchronized revision.
    let outcome = project.update(None).unwrap();
    assert!(matches!(outcome.sync, SyncResult::UpToDate { .. }));
}

#[test]
fn test_squash_contribution_to_review_branch() {
    let ws = Workspace::new();
    let project = ws.project();
    project.update(None).unwrap();
    let base = branch_tip(&ws.upstream, "main");

    ws.test_project
        .write_file(".ddx/library/prompts/claude/base.md", "Keep changes tiny.\n");
    commit_all(&ws.repo, "Tighten prompt");
    ws.test_project
        .write_file(".ddx/library/prompts/claude/extra.md", "Extra.\n");
    commit_all(&ws.repo, "Add extra prompt");

    let options = PushOptions {
        mode: PushMode::Squash,
        target_branch: Some("contrib/prompts".into()),
        message: Some("Prompt improvements".into()),
    };
    project.contribute(&options).unwrap();

    let tip = ws
        .upstream
        .find_commit(branch_tip(&ws.upstream, "contrib/prompts"))
        .unwrap();
    assert_eq!(tip.parent_id(0).unwrap(), base);
    assert_eq!(
        read_file(&ws.upstream, "contrib/prompts", "prompts/claude/base.md").as_deref(),
        Some("Keep changes tiny.\n")
    );
    assert_eq!(branch_tip(&ws.upstream, "main"), base);
}

#[test]
fn test_prompt_follows_library_updates() {
    let ws = Workspace::new();
    let project = ws.project();
    project.update(None).unwrap();

    let injector = project.prompt_injector(None).unwrap();
    injector.inject("claude/base.md").unwrap();
    assert!(injector.is_in_sync().unwrap());
    commit_all(&ws.repo, "Inject prompt");

    commit_files(
        &ws.upstream,
        "main",
        &[("prompts/claude/base.md", Some("Keep changes small and tested.\n"))],
        "Expand prompt",
    );
    project.update(None).unwrap();
    assert!(!injector.is_in_sync().unwrap());

    injector.inject("claude/base.md").unwrap();
    let claude = fs::read_to_string(ws.test_project.root().join("CLAUDE.md")).unwrap();
    assert!(predicate::str::contains("Keep changes small and tested.").eval(&claude));
    assert_eq!(injector.current_source().unwrap().as_deref(), Some("claude/base.md"));
}
