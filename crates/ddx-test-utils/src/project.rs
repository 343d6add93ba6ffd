//! [`TestProject`] builder for DDx project scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::git;

/// A temporary project directory with an isolated global config dir and
/// helpers for setup and assertion.
///
/// # Example
///
/// ```rust,no_run
/// use ddx_test_utils::project::TestProject;
///
/// let project = TestProject::new();
/// project.init_git();
/// project.write_config("[variables]\nproject_name = \"demo\"\n");
/// project.assert_file_exists(".ddx/config.toml");
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    global_dir: TempDir,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    /// Create an empty project directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            global_dir: TempDir::new().unwrap(),
        }
    }

    /// Return the project root.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory to use as the global (user-scope) config directory.
    pub fn global_config_dir(&self) -> PathBuf {
        self.global_dir.path().to_path_buf()
    }

    /// Initialise the directory as a git repository with one commit.
    pub fn init_git(&self) -> git2::Repository {
        git::real_git_repo_with_commit(self.root())
    }

    /// Write `.ddx/config.toml`.
    pub fn write_config(&self, content: &str) {
        self.write_file(".ddx/config.toml", content);
    }

    /// Write the global config file.
    pub fn write_global_config(&self, content: &str) {
        fs::write(self.global_dir.path().join("config.toml"), content).unwrap();
    }

    /// Write `.ddx/environments/<name>.toml`.
    pub fn write_environment(&self, name: &str, content: &str) {
        self.write_file(&format!(".ddx/environments/{name}.toml"), content);
    }

    /// Write `.ddx/profiles/<name>.toml`.
    pub fn write_profile(&self, name: &str, content: &str) {
        self.write_file(&format!(".ddx/profiles/{name}.toml"), content);
    }

    /// Write a file relative to the project root, creating parents.
    pub fn write_file(&self, path: &str, content: &str) {
        let full_path = self.root().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content)
            .unwrap_or_else(|e| panic!("Could not write {}: {e}", full_path.display()));
    }

    /// Read a file relative to the project root.
    ///
    /// # Panics
    /// Panics if the file cannot be read.
    pub fn read_file(&self, path: &str) -> String {
        let full_path = self.root().join(path);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()))
    }

    /// Assert that `path` (relative to the project root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.root().join(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that `path` (relative to the project root) does **not** exist.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path exists.
    pub fn assert_file_not_exists(&self, path: &str) {
        let full_path = self.root().join(path);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `path` (relative to root) contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, path: &str, content: &str) {
        let file_content = self.read_file(path);
        assert!(
            file_content.contains(content),
            "File {path} does not contain expected content.\nExpected: {content}\nActual: {file_content}"
        );
    }
}
