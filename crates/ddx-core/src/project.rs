//! The [`Project`] facade: configuration, templates and library sync for
//! one project root.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ddx_fs::{DdxPath, NormalizedPath, io};
use ddx_git::{PushOptions, SyncConfig, SyncResult, SyncState, Synchronizer};
use serde::{Deserialize, Serialize};

use crate::apply::{ApplyOptions, ApplyReport, AssetTree, apply};
use crate::config::{
    ConfigResolver, EnvSnapshot, ProfileStore, ResolvedConfig, remove_persona_binding,
    set_persona_binding,
};
use crate::persona::{Persona, PersonaInjector, PersonaLibrary};
use crate::prompt::{DEFAULT_PROMPT_FILE, PromptInjector};
use crate::substitute::Bindings;
use crate::update::{GithubReleases, ReleaseSource, UpdateCache, UpdateChecker};
use crate::{Error, PersonaError, Result};

/// Library directory holding templates.
pub const TEMPLATES_DIR: &str = "templates";
/// Resource rule that filters template files.
pub const TEMPLATES_RULE: &str = "templates";

/// One template application, as recorded in `.ddx/applied.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTemplate {
    /// Library revision the template was rendered from
    pub revision: String,
    pub applied_at: DateTime<Utc>,
}

/// Which library revision each template was last applied from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    #[serde(default)]
    pub templates: BTreeMap<String, AppliedTemplate>,
}

impl AppliedRecord {
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        match io::read_text_optional(path)? {
            Some(text) => toml::from_str(&text).map_err(|e| Error::Record(e.to_string())),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        let text = toml::to_string(self).map_err(|e| Error::Record(e.to_string()))?;
        io::write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    /// Templates applied from a revision other than `revision`.
    pub fn stale(&self, revision: &str) -> Vec<&str> {
        self.templates
            .iter()
            .filter(|(_, applied)| applied.revision != revision)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Result of [`Project::update`].
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub sync: SyncResult,
    /// Configuration resolved after the pull
    pub config: ResolvedConfig,
    /// Applied templates were rendered from an older library revision
    pub reapply_needed: bool,
}

/// Entry point for callers: binds a project root to an environment
/// snapshot and composes the resolver, apply engine and synchronizer.
///
/// # Example
///
/// ```ignore
/// use ddx_core::{Project, config::EnvSnapshot, apply::{ApplyOptions, Strategy}};
///
/// let project = Project::open("/path/to/project", EnvSnapshot::from_process());
/// let report = project.apply_template("readme", &ApplyOptions::with_strategy(Strategy::Ask), &Default::default())?;
/// for conflict in &report.conflicts {
///     println!("{} differs", conflict.path);
/// }
/// ```
pub struct Project {
    root: NormalizedPath,
    env: EnvSnapshot,
    global_config_dir: Option<PathBuf>,
}

impl Project {
    pub fn open(root: impl Into<NormalizedPath>, env: EnvSnapshot) -> Self {
        Self {
            root: root.into(),
            env,
            global_config_dir: None,
        }
    }

    /// Use `dir` for the global config layer instead of the platform
    /// config directory.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir = Some(dir.into());
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn resolver(&self) -> ConfigResolver {
        let resolver = ConfigResolver::new(self.root.clone(), self.env.clone());
        match &self.global_config_dir {
            Some(dir) => resolver.with_global_config_dir(dir.clone()),
            None => resolver,
        }
    }

    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.root.clone(), self.env.clone())
    }

    /// Resolve with the environment from `DDX_ENV` and the active profile.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        Ok(self.resolver().resolve_from_env()?)
    }

    pub fn library_dir(&self, config: &ResolvedConfig) -> NormalizedPath {
        self.root.join(&config.library_path)
    }

    fn applied_path(&self) -> NormalizedPath {
        self.root.join(DdxPath::AppliedRecord.as_str())
    }

    pub fn synchronizer(&self, config: &ResolvedConfig) -> Result<Synchronizer> {
        let sync_config = SyncConfig {
            url: config.repository_url.clone(),
            branch: config.branch.clone(),
            prefix: config.library_path.clone(),
        };
        Ok(Synchronizer::open(self.root.clone(), sync_config)?)
    }

    /// Apply library template `name` to the project root.
    ///
    /// Bindings are the resolved variables with `overrides` on top. The
    /// `templates` resource rule filters the template's files. After a
    /// real apply that needed no decisions, the library revision is
    /// recorded in `.ddx/applied.toml`.
    pub fn apply_template(
        &self,
        name: &str,
        options: &ApplyOptions,
        overrides: &Bindings,
    ) -> Result<ApplyReport> {
        let config = self.resolve()?;
        let template = NormalizedPath::new(name).ensure_relative()?;
        let source = self
            .library_dir(&config)
            .join(TEMPLATES_DIR)
            .join(template.as_str());

        let tree = AssetTree::load(&source, config.resource(TEMPLATES_RULE))?;
        let mut bindings = config.variables.clone();
        bindings.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let report = apply(&tree, &self.root, &bindings, options)?;

        if !options.dry_run && !report.needs_decision() {
            self.record_applied(&config, template.as_str())?;
        }
        Ok(report)
    }

    fn record_applied(&self, config: &ResolvedConfig, template: &str) -> Result<()> {
        let Some(state) = SyncState::load(&self.library_dir(config))? else {
            return Ok(());
        };
        let path = self.applied_path();
        let mut record = AppliedRecord::load(&path)?;
        record.templates.insert(
            template.to_string(),
            AppliedTemplate {
                revision: state.revision,
                applied_at: Utc::now(),
            },
        );
        record.save(&path)
    }

    /// Pull the library, then re-resolve configuration if files changed.
    pub fn update(&self, upstream_ref: Option<&str>) -> Result<UpdateOutcome> {
        let config = self.resolve()?;
        let sync = self.synchronizer(&config)?.pull(upstream_ref)?;

        let config = if sync.files_changed() {
            self.resolve()?
        } else {
            config
        };

        let reapply_needed = match &sync {
            SyncResult::Clean { revision, .. } | SyncResult::UpToDate { revision } => {
                !AppliedRecord::load(&self.applied_path())?
                    .stale(revision)
                    .is_empty()
            }
            _ => false,
        };

        Ok(UpdateOutcome {
            sync,
            config,
            reapply_needed,
        })
    }

    /// Publish local library changes upstream.
    pub fn contribute(&self, options: &PushOptions) -> Result<SyncResult> {
        let config = self.resolve()?;
        Ok(self.synchronizer(&config)?.push(options)?)
    }

    /// Injector for `document` (default `CLAUDE.md`) in the project root.
    pub fn prompt_injector(&self, document: Option<&str>) -> Result<PromptInjector> {
        let config = self.resolve()?;
        let document =
            NormalizedPath::new(document.unwrap_or(DEFAULT_PROMPT_FILE)).ensure_relative()?;
        PromptInjector::new(self.library_dir(&config), self.root.join(document.as_str()))
    }

    /// Personas in the vendored library.
    pub fn personas(&self) -> Result<PersonaLibrary> {
        let config = self.resolve()?;
        Ok(PersonaLibrary::in_library(&self.library_dir(&config)))
    }

    /// Persona injector for `document` (default `CLAUDE.md`).
    pub fn persona_injector(&self, document: Option<&str>) -> Result<PersonaInjector> {
        let document =
            NormalizedPath::new(document.unwrap_or(DEFAULT_PROMPT_FILE)).ensure_relative()?;
        PersonaInjector::new(self.root.join(document.as_str()))
    }

    /// Bind library persona `persona` to `role` in the project config.
    pub fn bind_persona(&self, role: &str, persona: &str) -> Result<()> {
        self.personas()?.load(persona)?;
        Ok(set_persona_binding(&self.root, role, persona)?)
    }

    /// Returns whether `role` had a project binding.
    pub fn unbind_persona(&self, role: &str) -> Result<bool> {
        Ok(remove_persona_binding(&self.root, role)?)
    }

    /// Inject the persona bound to `role` for `workflow`, keeping the
    /// other loaded roles. Returns the persona name.
    pub fn load_persona(
        &self,
        role: &str,
        workflow: Option<&str>,
        document: Option<&str>,
    ) -> Result<String> {
        let config = self.resolve()?;
        let name = config
            .personas
            .persona_for(role, workflow)
            .ok_or_else(|| PersonaError::Unbound {
                role: role.to_string(),
            })?;
        let persona = PersonaLibrary::in_library(&self.library_dir(&config)).load(name)?;
        self.persona_injector(document)?.inject(role, &persona)?;
        Ok(name.to_string())
    }

    /// Inject every persona bound for `workflow` into `document`,
    /// replacing whatever the region held. Returns role to persona name.
    pub fn load_personas(
        &self,
        workflow: Option<&str>,
        document: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let config = self.resolve()?;
        let library = PersonaLibrary::in_library(&self.library_dir(&config));
        let bound = config.personas.effective(workflow);

        let personas = bound
            .iter()
            .map(|(role, name)| Ok((role.clone(), library.load(name)?)))
            .collect::<Result<BTreeMap<String, Persona>>>()?;
        self.persona_injector(document)?.inject_all(&personas)?;

        tracing::info!(workflow = ?workflow, personas = bound.len(), "Bound personas loaded");
        Ok(bound)
    }

    /// Update checker against GitHub releases using the resolved policy,
    /// the per-user cache, and the disable override.
    pub fn update_checker(&self, current_version: &str) -> Result<UpdateChecker<GithubReleases>> {
        self.update_checker_with(current_version, GithubReleases::new(current_version))
    }

    pub fn update_checker_with<S: ReleaseSource>(
        &self,
        current_version: &str,
        source: S,
    ) -> Result<UpdateChecker<S>> {
        let config = self.resolve()?;
        Ok(UpdateChecker::new(
            current_version,
            config.update_check,
            UpdateCache::default_path(&self.env),
            source,
        )
        .disabled(self.env.update_check_disabled()))
    }
}
