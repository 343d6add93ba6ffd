//! Well-known DDx paths inside a project.

use std::path::Path;

/// Standard DDx filesystem markers and paths, relative to the project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdxPath {
    /// The `.ddx` directory (configuration root)
    DdxDir,
    /// The project-scope configuration file
    ProjectConfig,
    /// Directory holding environment override files
    EnvironmentsDir,
    /// Directory holding profile overlay files
    ProfilesDir,
    /// Marker naming the active profile
    ActiveProfile,
    /// Default vendored library prefix
    Library,
    /// Record of the library revision last applied to the project
    AppliedRecord,
}

impl DdxPath {
    /// Get the string representation of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DdxDir => ".ddx",
            Self::ProjectConfig => ".ddx/config.toml",
            Self::EnvironmentsDir => ".ddx/environments",
            Self::ProfilesDir => ".ddx/profiles",
            Self::ActiveProfile => ".ddx/profiles/ACTIVE",
            Self::Library => ".ddx/library",
            Self::AppliedRecord => ".ddx/applied.toml",
        }
    }
}

/// File name of the sync-state marker stored inside the vendored library.
pub const SYNC_MARKER: &str = ".ddx-sync";

impl AsRef<Path> for DdxPath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for DdxPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for DdxPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_paths_live_under_ddx_dir() {
        for p in [
            DdxPath::ProjectConfig,
            DdxPath::EnvironmentsDir,
            DdxPath::ProfilesDir,
            DdxPath::ActiveProfile,
            DdxPath::Library,
            DdxPath::AppliedRecord,
        ] {
            assert!(p.as_str().starts_with(DdxPath::DdxDir.as_str()), "{p}");
        }
    }
}
