//! Configuration resolution with layered merge
//!
//! The `ConfigResolver` loads every configuration layer that applies to a
//! project and merges them, lowest precedence first, into one
//! [`ResolvedConfig`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use ddx_fs::{DdxPath, NormalizedPath, validate_path_identifier};
use serde::Serialize;
use toml::Table;

use super::env::EnvSnapshot;
use super::layer::{
    ConfigLayer, LayerSource, PersonaSection, RepositorySection, ResourceRule, UpdateCheckSection,
};
use super::profile::ProfileStore;
use crate::error::ConfigError;

pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/easel/ddx";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_LIBRARY_PATH: &str = ".ddx/library";
pub const DEFAULT_CHECK_FREQUENCY_HOURS: u64 = 24;

/// When and whether to look for a newer release of DDx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateCheckPolicy {
    pub enabled: bool,
    pub frequency_hours: u64,
}

impl Default for UpdateCheckPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency_hours: DEFAULT_CHECK_FREQUENCY_HOURS,
        }
    }
}

/// The final configuration after merging every layer
///
/// Built fresh per invocation and never written back; each layer is
/// persisted separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub repository_url: String,
    pub branch: String,
    /// Vendored library directory, relative to the project root
    pub library_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub resources: BTreeMap<String, ResourceRule>,
    pub update_check: UpdateCheckPolicy,
    pub personas: PersonaSection,
    pub extensions: Table,
    #[serde(skip)]
    provenance: BTreeMap<String, LayerSource>,
}

impl ResolvedConfig {
    /// The layer that supplied `key` (a dotted path such as
    /// `repository.branch` or `variables.port`).
    ///
    /// For a section key such as `resources.templates`, returns the
    /// highest-precedence layer that set anything below it.
    pub fn source_of(&self, key: &str) -> Option<&LayerSource> {
        if let Some(source) = self.provenance.get(key) {
            return Some(source);
        }
        let prefix = format!("{key}.");
        self.provenance
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, source)| source)
            .max()
    }

    /// Inclusion rule by name.
    pub fn resource(&self, name: &str) -> Option<&ResourceRule> {
        self.resources.get(name)
    }

    /// Canonical TOML rendering. Identical inputs render identical bytes.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

/// Resolves configuration by merging every applicable layer
///
/// Layers, lowest precedence first:
/// 1. Built-in defaults
/// 2. Global config (`<config_dir>/ddx/config.toml`)
/// 3. Project config (`.ddx/config.toml`, required)
/// 4. Environment override (`.ddx/environments/<name>.toml`)
/// 5. Active profile (`.ddx/profiles/<name>.toml`)
/// 6. Recognized `DDX_*` process environment variables
///
/// Scalars from later layers replace earlier ones. Variables, resource
/// rules and extensions merge key by key.
pub struct ConfigResolver {
    /// Project root directory
    root: NormalizedPath,

    env: EnvSnapshot,

    /// Override for the global config directory (used for testing).
    /// When `None`, `dirs::config_dir()/ddx` is used.
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver for the project at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - The project root directory containing `.ddx/`
    /// * `env` - Process environment captured for this invocation
    pub fn new(root: impl Into<NormalizedPath>, env: EnvSnapshot) -> Self {
        Self {
            root: root.into(),
            env,
            global_config_dir_override: None,
        }
    }

    /// Use `dir` instead of the platform config directory for the global
    /// layer.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir_override = Some(dir.into());
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join("ddx"))
    }

    /// Path of the global config file, if the platform has a config dir.
    pub fn global_config_path(&self) -> Option<NormalizedPath> {
        self.global_config_dir()
            .map(|dir| NormalizedPath::new(dir.join("config.toml")))
    }

    pub fn project_config_path(&self) -> NormalizedPath {
        self.root.join(DdxPath::ProjectConfig.as_str())
    }

    pub fn environment_config_path(&self, name: &str) -> NormalizedPath {
        self.root
            .join(DdxPath::EnvironmentsDir.as_str())
            .join(&format!("{name}.toml"))
    }

    /// Check if the project has been initialized
    pub fn has_config(&self) -> bool {
        self.project_config_path().is_file()
    }

    /// Load the project layer alone.
    pub fn project_layer(&self) -> Result<ConfigLayer, ConfigError> {
        let path = self.project_config_path();
        ConfigLayer::load(&LayerSource::Project, &path)?.ok_or_else(|| {
            ConfigError::NotInitialized {
                path: path.to_native(),
            }
        })
    }

    /// Built-in defaults. `project_name` is the project directory name.
    pub fn defaults(&self) -> ConfigLayer {
        let mut variables = BTreeMap::new();
        if let Some(name) = self.project_name() {
            variables.insert("project_name".to_string(), name);
        }
        ConfigLayer {
            repository: RepositorySection {
                url: Some(DEFAULT_REPOSITORY_URL.to_string()),
                branch: Some(DEFAULT_BRANCH.to_string()),
                path: Some(DEFAULT_LIBRARY_PATH.to_string()),
            },
            variables,
            update_check: UpdateCheckSection {
                enabled: Some(true),
                frequency_hours: Some(DEFAULT_CHECK_FREQUENCY_HOURS),
            },
            ..ConfigLayer::default()
        }
    }

    fn project_name(&self) -> Option<String> {
        let resolved = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        resolved
            .file_name()
            .filter(|name| !name.is_empty() && *name != ".")
            .map(str::to_string)
    }

    /// Resolve the configuration for `environment` and `profile`.
    ///
    /// Missing optional layers are skipped. A missing project file is
    /// [`ConfigError::NotInitialized`]; a named profile that does not
    /// exist is [`ConfigError::ProfileNotFound`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// use ddx_core::config::{ConfigResolver, EnvSnapshot};
    ///
    /// let resolver = ConfigResolver::new("/path/to/project", EnvSnapshot::from_process());
    /// let config = resolver.resolve(Some("staging"), None)?;
    /// println!("Branch: {}", config.branch);
    /// ```
    pub fn resolve(
        &self,
        environment: Option<&str>,
        profile: Option<&str>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let environment = environment.map(str::trim).filter(|e| !e.is_empty());
        let profile = profile.map(str::trim).filter(|p| !p.is_empty());

        let mut merged = ConfigLayer::default();
        let mut provenance = BTreeMap::new();
        let mut overlay = |source: LayerSource, layer: &ConfigLayer| {
            for key in layer.flatten().into_keys() {
                provenance.insert(key, source.clone());
            }
            merged.merge(layer);
        };

        overlay(LayerSource::Defaults, &self.defaults());

        if let Some(path) = self.global_config_path() {
            match ConfigLayer::load(&LayerSource::Global, &path)? {
                Some(layer) => overlay(LayerSource::Global, &layer),
                None => tracing::debug!(%path, "No global config found, skipping"),
            }
        }

        overlay(LayerSource::Project, &self.project_layer()?);

        if let Some(name) = environment {
            let source = LayerSource::Environment(name.to_string());
            validate_path_identifier(name).map_err(|e| ConfigError::InvalidValue {
                layer: source.clone(),
                key: "environment".into(),
                message: e.to_string(),
            })?;
            let path = self.environment_config_path(name);
            match ConfigLayer::load(&source, &path)? {
                Some(layer) => overlay(source, &layer),
                None => tracing::debug!(%path, "No environment override found, skipping"),
            }
        }

        if let Some(name) = profile {
            let layer = ProfileStore::new(self.root.clone(), self.env.clone()).load(name)?;
            overlay(LayerSource::Profile(name.to_string()), &layer);
        }

        overlay(LayerSource::ProcessEnv, &self.env.overrides_layer());

        self.finish(merged, provenance, environment, profile)
    }

    /// Resolve with the environment from `DDX_ENV` and the active profile.
    pub fn resolve_from_env(&self) -> Result<ResolvedConfig, ConfigError> {
        let profile = ProfileStore::new(self.root.clone(), self.env.clone()).active()?;
        self.resolve(self.env.environment(), profile.as_deref())
    }

    fn finish(
        &self,
        merged: ConfigLayer,
        provenance: BTreeMap<String, LayerSource>,
        environment: Option<&str>,
        profile: Option<&str>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let library_path = merged
            .repository
            .path
            .unwrap_or_else(|| DEFAULT_LIBRARY_PATH.to_string());
        let cleaned = NormalizedPath::new(&library_path)
            .ensure_relative()
            .map_err(|e| ConfigError::InvalidValue {
                layer: provenance
                    .get("repository.path")
                    .cloned()
                    .unwrap_or(LayerSource::Defaults),
                key: "repository.path".into(),
                message: e.to_string(),
            })?;

        let variables = merged
            .variables
            .into_iter()
            .map(|(name, value)| {
                let expanded = self.env.expand(&value);
                (name, expanded)
            })
            .collect();

        let config = ResolvedConfig {
            repository_url: merged
                .repository
                .url
                .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string()),
            branch: merged
                .repository
                .branch
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            library_path: cleaned.as_str().to_string(),
            environment: environment.map(str::to_string),
            profile: profile.map(str::to_string),
            variables,
            resources: merged.resources,
            update_check: UpdateCheckPolicy {
                enabled: merged.update_check.enabled.unwrap_or(true),
                frequency_hours: merged
                    .update_check
                    .frequency_hours
                    .unwrap_or(DEFAULT_CHECK_FREQUENCY_HOURS),
            },
            personas: merged.personas,
            extensions: merged.extensions,
            provenance,
        };
        tracing::debug!(
            environment = ?config.environment,
            profile = ?config.profile,
            variables = config.variables.len(),
            "Configuration resolved"
        );
        Ok(config)
    }
}
