//! Tests for rendering library assets into a project

use std::fs;

use ddx_core::apply::{
    ApplyOptions, AssetTree, Classification, Resolution, Strategy, apply,
};
use ddx_core::config::ResourceRule;
use ddx_core::substitute::{Bindings, Strictness};
use ddx_core::ApplyError;
use ddx_fs::NormalizedPath;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

struct Fixture {
    library: TempDir,
    target: TempDir,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let library = TempDir::new().unwrap();
        for (path, content) in files {
            let full = library.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        Self {
            library,
            target: TempDir::new().unwrap(),
        }
    }

    fn tree(&self) -> AssetTree {
        AssetTree::load(&NormalizedPath::new(self.library.path()), None).unwrap()
    }

    fn target(&self) -> NormalizedPath {
        NormalizedPath::new(self.target.path())
    }

    fn existing(&self, path: &str, content: &str) {
        let full = self.target.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn read(&self, path: &str) -> String {
        fs::read_to_string(self.target.path().join(path)).unwrap()
    }

    fn run(&self, options: &ApplyOptions) -> Result<ddx_core::ApplyReport, ApplyError> {
        apply(&self.tree(), &self.target(), &bindings(), options)
    }
}

fn bindings() -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert("project_name".into(), "demo".into());
    bindings.insert("port".into(), "8080".into());
    bindings
}

fn paths(list: Vec<&NormalizedPath>) -> Vec<&str> {
    list.into_iter().map(NormalizedPath::as_str).collect()
}

#[test]
fn renders_paths_and_content() {
    let fixture = Fixture::new(&[
        ("README.md", "# {{project_name}}\n"),
        ("config/{{project_name}}.env", "PORT={{port}}\nHOST={{host || localhost}}\n"),
    ]);

    let report = fixture.run(&ApplyOptions::default()).unwrap();

    assert_eq!(paths(report.created()), vec!["README.md", "config/demo.env"]);
    assert_eq!(report.written, 2);
    assert_eq!(fixture.read("README.md"), "# demo\n");
    assert_eq!(fixture.read("config/demo.env"), "PORT=8080\nHOST=localhost\n");
}

#[rstest]
#[case(Strategy::Skip)]
#[case(Strategy::Overwrite)]
#[case(Strategy::Merge)]
#[case(Strategy::Ask)]
fn dry_run_reports_what_a_real_run_does(#[case] strategy: Strategy) {
    let files = [("a.md", "new a\n"), ("b.md", "same\n"), ("c.md", "fresh\n")];
    let dry = Fixture::new(&files);
    let real = Fixture::new(&files);
    for fixture in [&dry, &real] {
        fixture.existing("a.md", "old a\n");
        fixture.existing("b.md", "same\n");
    }

    let options = ApplyOptions::with_strategy(strategy);
    let dry_report = dry.run(&options.clone().dry_run(true)).unwrap();
    let real_report = real.run(&options).unwrap();

    assert_eq!(dry_report.outcomes, real_report.outcomes);
    assert!(!dry.target.path().join("c.md").exists());
    assert_eq!(dry.read("a.md"), "old a\n");
}

#[test]
fn skip_never_modifies_existing_files() {
    let fixture = Fixture::new(&[("a.md", "library\n"), ("new.md", "new\n")]);
    fixture.existing("a.md", "mine\n");

    let report = fixture.run(&ApplyOptions::with_strategy(Strategy::Skip)).unwrap();

    assert_eq!(paths(report.skipped()), vec!["a.md"]);
    assert_eq!(paths(report.created()), vec!["new.md"]);
    assert_eq!(fixture.read("a.md"), "mine\n");
    assert_eq!(report.conflicts.len(), 1);
}

#[test]
fn overwrite_leaves_rendered_content() {
    let fixture = Fixture::new(&[("a.md", "name={{project_name}}\n")]);
    fixture.existing("a.md", "mine\n");

    let report = fixture
        .run(&ApplyOptions::with_strategy(Strategy::Overwrite))
        .unwrap();

    assert_eq!(paths(report.updated()), vec!["a.md"]);
    assert_eq!(fixture.read("a.md"), "name=demo\n");
}

#[test]
fn reapplying_is_unchanged() {
    let fixture = Fixture::new(&[("a.md", "{{port}}\n")]);
    fixture.run(&ApplyOptions::default()).unwrap();

    let report = fixture
        .run(&ApplyOptions::with_strategy(Strategy::Overwrite))
        .unwrap();

    assert_eq!(paths(report.unchanged()), vec!["a.md"]);
    assert_eq!(report.written, 0);
    assert!(report.conflicts.is_empty());
}

#[test]
fn ask_reports_conflicts_and_writes_nothing_until_decided() {
    let fixture = Fixture::new(&[("a.md", "library a\n"), ("b.md", "library b\n")]);
    fixture.existing("a.md", "local a\n");

    let report = fixture.run(&ApplyOptions::with_strategy(Strategy::Ask)).unwrap();

    assert!(report.needs_decision());
    assert_eq!(report.written, 0);
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.path.as_str(), "a.md");
    assert_eq!(conflict.existing, "local a\n");
    assert_eq!(conflict.incoming, "library a\n");
    assert!(!fixture.target.path().join("b.md").exists());

    let decided = ApplyOptions::with_strategy(Strategy::Ask).decide("a.md", Resolution::Overwrite);
    let report = fixture.run(&decided).unwrap();

    assert!(!report.needs_decision());
    assert_eq!(report.written, 2);
    assert_eq!(fixture.read("a.md"), "library a\n");
    assert_eq!(fixture.read("b.md"), "library b\n");
}

#[test]
fn merge_adds_missing_json_keys_and_keeps_existing_values() {
    let fixture = Fixture::new(&[(
        "settings.json",
        r#"{"name": "{{project_name}}", "editor": {"tabs": 4, "theme": "dark"}}"#,
    )]);
    fixture.existing("settings.json", r#"{"name": "custom", "editor": {"tabs": 2}}"#);

    let report = fixture.run(&ApplyOptions::with_strategy(Strategy::Merge)).unwrap();

    assert_eq!(paths(report.updated()), vec!["settings.json"]);
    let merged: serde_json::Value =
        serde_json::from_str(&fixture.read("settings.json")).unwrap();
    assert_eq!(
        merged,
        serde_json::json!({"name": "custom", "editor": {"tabs": 2, "theme": "dark"}})
    );
}

#[test]
fn merge_toml_respects_override_list() {
    let fixture = Fixture::new(&[(
        "tool.toml",
        "ddx_override = [\"tool.version\"]\n\n[tool]\nversion = \"2\"\nchannel = \"stable\"\n",
    )]);
    fixture.existing("tool.toml", "[tool]\nversion = \"1\"\n");

    fixture.run(&ApplyOptions::with_strategy(Strategy::Merge)).unwrap();

    let merged: toml::Table = fixture.read("tool.toml").parse().unwrap();
    assert_eq!(merged["tool"]["version"].as_str(), Some("2"));
    assert_eq!(merged["tool"]["channel"].as_str(), Some("stable"));
    assert!(!merged.contains_key("ddx_override"));
}

#[test]
fn merge_of_text_writes_conflict_markers() {
    let fixture = Fixture::new(&[("notes.md", "# Title\nlibrary line\nfooter\n")]);
    fixture.existing("notes.md", "# Title\nlocal line\nfooter\n");

    let report = fixture.run(&ApplyOptions::with_strategy(Strategy::Merge)).unwrap();

    assert_eq!(paths(report.conflicted()), vec!["notes.md"]);
    assert!(!report.needs_decision());
    insta::assert_snapshot!(fixture.read("notes.md"), @r"
    # Title
    <<<<<<< existing
    local line
    =======
    library line
    >>>>>>> incoming
    footer
    ");
}

#[test]
fn strict_unbound_variable_aborts_without_writing() {
    let fixture = Fixture::new(&[("a.md", "ok\n"), ("b.md", "{{missing}}\n")]);

    let err = fixture.run(&ApplyOptions::default()).unwrap_err();

    assert!(matches!(err, ApplyError::Aborted { nodes_completed: 1, .. }));
    assert!(!fixture.target.path().join("a.md").exists());

    let report = fixture
        .run(&ApplyOptions::default().strictness(Strictness::Relaxed))
        .unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(fixture.read("b.md"), "{{missing}}\n");
}

#[test]
fn resource_rule_filters_tree() {
    let fixture = Fixture::new(&[
        ("docs/guide.md", "guide"),
        ("docs/draft.md", "draft"),
        ("scripts/run.sh", "run"),
    ]);
    let rule = ResourceRule {
        include: vec!["docs/**".into()],
        exclude: vec!["**/draft.md".into()],
    };

    let tree = AssetTree::load(&NormalizedPath::new(fixture.library.path()), Some(&rule)).unwrap();
    let names: Vec<&str> = tree.nodes().iter().map(|n| n.path.as_str()).collect();

    assert_eq!(names, vec!["docs/guide.md"]);
}

#[test]
fn missing_source_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = AssetTree::load(&NormalizedPath::new(dir.path().join("nope")), None).unwrap_err();
    assert!(matches!(err, ApplyError::SourceNotFound { .. }));
}

#[test]
fn binary_assets_copy_verbatim_and_never_merge() {
    let fixture = Fixture::new(&[]);
    let bytes = [0u8, 159, 146, 150, 0, 1];
    fs::write(fixture.library.path().join("logo.bin"), bytes).unwrap();

    fixture.run(&ApplyOptions::default()).unwrap();
    assert_eq!(fs::read(fixture.target.path().join("logo.bin")).unwrap(), bytes);

    fs::write(fixture.target.path().join("logo.bin"), [1u8, 2, 3]).unwrap();
    let report = fixture.run(&ApplyOptions::with_strategy(Strategy::Merge)).unwrap();

    assert_eq!(report.outcomes[0].classification, Classification::Conflict);
    assert_eq!(fs::read(fixture.target.path().join("logo.bin")).unwrap(), [1u8, 2, 3]);
}
