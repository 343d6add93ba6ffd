//! Named, activatable configuration overlays stored in `.ddx/profiles`.

use ddx_fs::{DdxPath, NormalizedPath, io, validate_path_identifier};

use super::env::EnvSnapshot;
use super::layer::{ConfigLayer, LayerSource};
use crate::error::ConfigError;

/// Binding added to every created profile, naming the profile itself.
pub const PROFILE_VARIABLE: &str = "ddx_profile";

/// One key whose value differs between two profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDifference {
    /// Dotted key, e.g. `variables.port`
    pub key: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// CRUD and activation for the profiles of one project.
///
/// Each mutating call writes or removes exactly one file, and writes go
/// through [`io::write_atomic`].
pub struct ProfileStore {
    root: NormalizedPath,
    env: EnvSnapshot,
}

impl ProfileStore {
    pub fn new(root: impl Into<NormalizedPath>, env: EnvSnapshot) -> Self {
        Self {
            root: root.into(),
            env,
        }
    }

    fn dir(&self) -> NormalizedPath {
        self.root.join(DdxPath::ProfilesDir.as_str())
    }

    fn marker(&self) -> NormalizedPath {
        self.root.join(DdxPath::ActiveProfile.as_str())
    }

    /// File backing profile `name`.
    pub fn path(&self, name: &str) -> NormalizedPath {
        self.dir().join(&format!("{name}.toml"))
    }

    fn check_name(name: &str) -> Result<(), ConfigError> {
        validate_path_identifier(name).map_err(|e| ConfigError::InvalidProfileName {
            name: name.to_string(),
            reason: match e {
                ddx_fs::Error::InvalidIdentifier { reason, .. } => reason,
                other => other.to_string(),
            },
        })
    }

    fn existing_path(&self, name: &str) -> Result<NormalizedPath, ConfigError> {
        Self::check_name(name)?;
        let path = self.path(name);
        if !path.is_file() {
            return Err(ConfigError::ProfileNotFound {
                name: name.to_string(),
            });
        }
        Ok(path)
    }

    pub fn exists(&self, name: &str) -> bool {
        Self::check_name(name).is_ok() && self.path(name).is_file()
    }

    /// Create profile `name` from the project layer, adding the
    /// `ddx_profile` binding.
    pub fn create(&self, name: &str) -> Result<NormalizedPath, ConfigError> {
        Self::check_name(name)?;
        let path = self.path(name);
        if path.exists() {
            return Err(ConfigError::ProfileExists {
                name: name.to_string(),
            });
        }

        let project_path = self.root.join(DdxPath::ProjectConfig.as_str());
        let mut layer = ConfigLayer::load(&LayerSource::Project, &project_path)?.ok_or_else(
            || ConfigError::NotInitialized {
                path: project_path.to_native(),
            },
        )?;
        layer
            .variables
            .insert(PROFILE_VARIABLE.to_string(), name.to_string());

        io::write_atomic(&path, layer.to_toml()?.as_bytes())?;
        tracing::info!(profile = name, "Profile created");
        Ok(path)
    }

    /// Load and validate profile `name`.
    pub fn load(&self, name: &str) -> Result<ConfigLayer, ConfigError> {
        let path = self.existing_path(name)?;
        let source = LayerSource::Profile(name.to_string());
        ConfigLayer::load(&source, &path)?.ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
        })
    }

    /// Check that profile `name` exists and parses against the schema.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.load(name).map(|_| ())
    }

    /// Select `name` as the active profile.
    pub fn activate(&self, name: &str) -> Result<(), ConfigError> {
        self.validate(name)?;
        io::write_atomic(&self.marker(), format!("{name}\n").as_bytes())?;
        tracing::info!(profile = name, "Profile activated");
        Ok(())
    }

    /// Clear the active profile. Returns whether one was active.
    pub fn deactivate(&self) -> Result<bool, ConfigError> {
        Ok(io::remove_file_if_exists(&self.marker())?)
    }

    /// The active profile: `DDX_PROFILE` if set, otherwise the ACTIVE marker.
    pub fn active(&self) -> Result<Option<String>, ConfigError> {
        if let Some(name) = self.env.profile() {
            return Ok(Some(name.to_string()));
        }
        Ok(io::read_text_optional(&self.marker())?
            .map(|text| text.trim().to_string())
            .filter(|name| !name.is_empty()))
    }

    /// Copy profile `source` to a new profile `target`, byte for byte.
    pub fn copy(&self, source: &str, target: &str) -> Result<NormalizedPath, ConfigError> {
        let source_path = self.existing_path(source)?;
        Self::check_name(target)?;
        let target_path = self.path(target);
        if target_path.exists() {
            return Err(ConfigError::ProfileExists {
                name: target.to_string(),
            });
        }

        let content = io::read_text(&source_path)?;
        ConfigLayer::parse(
            &LayerSource::Profile(source.to_string()),
            &source_path.to_native(),
            &content,
        )?;
        io::write_atomic(&target_path, content.as_bytes())?;
        tracing::info!(source, target, "Profile copied");
        Ok(target_path)
    }

    /// Delete profile `name`. An active profile cannot be deleted.
    pub fn delete(&self, name: &str) -> Result<(), ConfigError> {
        let path = self.existing_path(name)?;
        if self.active()?.as_deref() == Some(name) {
            return Err(ConfigError::ProfileActive {
                name: name.to_string(),
            });
        }
        io::remove_file_if_exists(&path)?;
        tracing::info!(profile = name, "Profile deleted");
        Ok(())
    }

    /// Profile names, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let dir = self.dir();
        let entries = match std::fs::read_dir(dir.to_native()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ddx_fs::Error::io(dir.to_native(), e).into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".toml").map(str::to_string)
            })
            .filter(|name| Self::check_name(name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Keys whose values differ between profiles `left` and `right`,
    /// sorted by key.
    pub fn diff(&self, left: &str, right: &str) -> Result<Vec<ProfileDifference>, ConfigError> {
        let left = self.load(left)?.flatten();
        let right = self.load(right)?.flatten();

        let mut keys: Vec<&String> = left.keys().chain(right.keys()).collect();
        keys.sort();
        keys.dedup();

        Ok(keys
            .into_iter()
            .filter(|key| left.get(*key) != right.get(*key))
            .map(|key| ProfileDifference {
                key: key.clone(),
                left: left.get(key).cloned(),
                right: right.get(key).cloned(),
            })
            .collect())
    }
}

/// Write the initial project config. Refuses to overwrite.
pub fn init_project(
    root: impl Into<NormalizedPath>,
    layer: &ConfigLayer,
) -> Result<NormalizedPath, ConfigError> {
    let path = root.into().join(DdxPath::ProjectConfig.as_str());
    if path.exists() {
        return Err(ConfigError::AlreadyInitialized {
            path: path.to_native(),
        });
    }
    io::write_atomic(&path, layer.to_toml()?.as_bytes())?;
    tracing::info!(path = %path, "Project initialized");
    Ok(path)
}
