//! A single configuration layer: a partial, typed view of one source.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use ddx_fs::{NormalizedPath, io};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::error::ConfigError;

/// Where a configuration layer came from, in ascending precedence order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LayerSource {
    Defaults,
    Global,
    Project,
    Environment(String),
    Profile(String),
    ProcessEnv,
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::Global => write!(f, "global"),
            Self::Project => write!(f, "project"),
            Self::Environment(name) => write!(f, "environment '{name}'"),
            Self::Profile(name) => write!(f, "profile '{name}'"),
            Self::ProcessEnv => write!(f, "process environment"),
        }
    }
}

/// `[repository]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Vendored library directory relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RepositorySection {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.branch.is_none() && self.path.is_none()
    }
}

/// A named inclusion rule: glob patterns relative to the asset root.
///
/// An empty `include` list includes everything. `exclude` wins over
/// `include`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl ResourceRule {
    fn merge(&mut self, other: &ResourceRule) {
        if !other.include.is_empty() {
            self.include = other.include.clone();
        }
        if !other.exclude.is_empty() {
            self.exclude = other.exclude.clone();
        }
    }
}

/// `[update_check]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_hours: Option<u64>,
}

impl UpdateCheckSection {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.frequency_hours.is_none()
    }
}

/// `[personas]`: which persona fills each role.
///
/// `bindings` maps a role to a persona name. `overrides` maps a workflow
/// name to role bindings that win over `bindings` while that workflow runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSection {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
}

impl PersonaSection {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.overrides.is_empty()
    }

    /// Persona bound to `role`, with the `workflow` override first.
    pub fn persona_for(&self, role: &str, workflow: Option<&str>) -> Option<&str> {
        workflow
            .and_then(|w| self.overrides.get(w))
            .and_then(|roles| roles.get(role))
            .or_else(|| self.bindings.get(role))
            .map(String::as_str)
    }

    /// Every role binding in effect for `workflow`.
    pub fn effective(&self, workflow: Option<&str>) -> BTreeMap<String, String> {
        let mut out = self.bindings.clone();
        if let Some(roles) = workflow.and_then(|w| self.overrides.get(w)) {
            out.extend(roles.iter().map(|(role, name)| (role.clone(), name.clone())));
        }
        out
    }

    fn merge(&mut self, other: &PersonaSection) {
        for (role, name) in &other.bindings {
            self.bindings.insert(role.clone(), name.clone());
        }
        for (workflow, roles) in &other.overrides {
            let entry = self.overrides.entry(workflow.clone()).or_default();
            for (role, name) in roles {
                entry.insert(role.clone(), name.clone());
            }
        }
    }
}

/// One partial configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "RepositorySection::is_empty")]
    pub repository: RepositorySection,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceRule>,
    #[serde(default, skip_serializing_if = "UpdateCheckSection::is_empty")]
    pub update_check: UpdateCheckSection,
    #[serde(default, skip_serializing_if = "PersonaSection::is_empty")]
    pub personas: PersonaSection,
    /// Passed through without validation
    #[serde(default, skip_serializing_if = "Table::is_empty")]
    pub extensions: Table,
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "repository",
    "variables",
    "resources",
    "update_check",
    "personas",
    "extensions",
];
const REPOSITORY_KEYS: &[&str] = &["url", "branch", "path"];
const RESOURCE_KEYS: &[&str] = &["include", "exclude"];
const UPDATE_CHECK_KEYS: &[&str] = &["enabled", "frequency_hours"];
const PERSONA_KEYS: &[&str] = &["bindings", "overrides"];

impl ConfigLayer {
    /// Parse and validate a layer document.
    ///
    /// # Arguments
    ///
    /// * `source` - Which layer this is, for error context
    /// * `path` - File the content was read from, for error context
    /// * `content` - TOML text
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ParseFailure`] on a TOML syntax error
    /// - [`ConfigError::UnknownField`] for keys outside the schema (except under `[extensions]`)
    /// - [`ConfigError::InvalidValue`] for values of the wrong type
    pub fn parse(source: &LayerSource, path: &Path, content: &str) -> Result<Self, ConfigError> {
        let mut table: Table = content.parse().map_err(|e: toml::de::Error| {
            ConfigError::ParseFailure {
                layer: source.clone(),
                path: path.to_path_buf(),
                line: e.span().map(|span| line_of(content, span.start)),
                message: e.message().to_string(),
            }
        })?;

        Validator {
            source,
            path,
            content,
        }
        .validate(&mut table)?;

        Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidValue {
                layer: source.clone(),
                key: String::new(),
                message: e.message().to_string(),
            })
    }

    /// Load a layer file, returning `None` when it does not exist.
    pub fn load(source: &LayerSource, path: &NormalizedPath) -> Result<Option<Self>, ConfigError> {
        match io::read_text_optional(path)? {
            Some(content) => {
                tracing::debug!(layer = %source, path = %path, "Loading config layer");
                Self::parse(source, &path.to_native(), &content).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Render the layer as a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Overlay `other` on top of this layer.
    ///
    /// Scalars from `other` replace. `variables`, `resources` and persona
    /// bindings merge key by key, and within a resource rule a non-empty
    /// list replaces. `extensions` merge recursively.
    pub fn merge(&mut self, other: &ConfigLayer) {
        let repo = &other.repository;
        if repo.url.is_some() {
            self.repository.url = repo.url.clone();
        }
        if repo.branch.is_some() {
            self.repository.branch = repo.branch.clone();
        }
        if repo.path.is_some() {
            self.repository.path = repo.path.clone();
        }

        for (key, value) in &other.variables {
            self.variables.insert(key.clone(), value.clone());
        }

        for (name, rule) in &other.resources {
            self.resources.entry(name.clone()).or_default().merge(rule);
        }

        if other.update_check.enabled.is_some() {
            self.update_check.enabled = other.update_check.enabled;
        }
        if other.update_check.frequency_hours.is_some() {
            self.update_check.frequency_hours = other.update_check.frequency_hours;
        }

        self.personas.merge(&other.personas);
        merge_tables(&mut self.extensions, &other.extensions);
    }

    /// Every leaf this layer sets, keyed by dotted path, with its value
    /// rendered as TOML.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Ok(Value::Table(table)) = Value::try_from(self) {
            flatten_into(&mut out, "", &table);
        }
        out
    }
}

fn merge_tables(base: &mut Table, other: &Table) {
    for (key, value) in other {
        match (base.get_mut(key), value) {
            (Some(Value::Table(base_table)), Value::Table(other_table)) => {
                merge_tables(base_table, other_table);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, table: &Table) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(inner) if !inner.is_empty() => flatten_into(out, &path, inner),
            other => {
                out.insert(path, other.to_string());
            }
        }
    }
}

/// 1-based line of a byte offset.
pub(super) fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Best-effort line of `key` in the source text. The untyped table does
/// not keep spans, so this looks for an assignment or a table header
/// naming the key.
fn find_key_line(content: &str, key: &str) -> Option<usize> {
    let leaf = key.rsplit('.').next().unwrap_or(key);
    content.lines().enumerate().find_map(|(index, line)| {
        let trimmed = line.trim_start();
        let assignment = trimmed
            .split_once('=')
            .map(|(lhs, _)| lhs.trim().trim_matches('"') == leaf)
            .unwrap_or(false);
        let header = trimmed.starts_with('[')
            && trimmed
                .trim_matches(|c| c == '[' || c == ']')
                .trim()
                .ends_with(key);
        (assignment || header).then_some(index + 1)
    })
}

struct Validator<'a> {
    source: &'a LayerSource,
    path: &'a Path,
    content: &'a str,
}

impl Validator<'_> {
    fn unknown(&self, key: String) -> ConfigError {
        ConfigError::UnknownField {
            layer: self.source.clone(),
            path: self.path.to_path_buf(),
            line: find_key_line(self.content, &key),
            key,
        }
    }

    fn invalid(&self, key: impl Into<String>, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            layer: self.source.clone(),
            key: key.into(),
            message: message.into(),
        }
    }

    fn validate(&self, table: &mut Table) -> Result<(), ConfigError> {
        for key in table.keys() {
            if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
                return Err(self.unknown(key.clone()));
            }
        }

        if let Some(value) = table.get("repository") {
            let section = self.section(value, "repository", REPOSITORY_KEYS)?;
            for (key, value) in section {
                if !value.is_str() {
                    return Err(self.invalid(format!("repository.{key}"), "expected a string"));
                }
            }
        }

        if let Some(value) = table.get_mut("variables") {
            let Value::Table(vars) = value else {
                return Err(self.invalid("variables", "expected a table"));
            };
            for (name, value) in vars.iter_mut() {
                let text = match value {
                    Value::String(_) => continue,
                    Value::Integer(i) => i.to_string(),
                    Value::Float(f) => f.to_string(),
                    Value::Boolean(b) => b.to_string(),
                    _ => {
                        return Err(self.invalid(
                            format!("variables.{name}"),
                            "expected a string, number or boolean",
                        ));
                    }
                };
                *value = Value::String(text);
            }
        }

        if let Some(value) = table.get("resources") {
            let Value::Table(rules) = value else {
                return Err(self.invalid("resources", "expected a table"));
            };
            for (name, rule) in rules {
                let rule = self.section(rule, &format!("resources.{name}"), RESOURCE_KEYS)?;
                for (key, patterns) in rule {
                    let valid = patterns
                        .as_array()
                        .is_some_and(|items| items.iter().all(Value::is_str));
                    if !valid {
                        return Err(self.invalid(
                            format!("resources.{name}.{key}"),
                            "expected an array of strings",
                        ));
                    }
                }
            }
        }

        if let Some(value) = table.get("update_check") {
            let section = self.section(value, "update_check", UPDATE_CHECK_KEYS)?;
            if let Some(enabled) = section.get("enabled")
                && !enabled.is_bool()
            {
                return Err(self.invalid("update_check.enabled", "expected a boolean"));
            }
            if let Some(hours) = section.get("frequency_hours") {
                match hours.as_integer() {
                    Some(h) if h > 0 => {}
                    _ => {
                        return Err(self.invalid(
                            "update_check.frequency_hours",
                            "expected a positive integer",
                        ));
                    }
                }
            }
        }

        if let Some(value) = table.get("personas") {
            let section = self.section(value, "personas", PERSONA_KEYS)?;
            if let Some(bindings) = section.get("bindings") {
                self.string_table(bindings, "personas.bindings")?;
            }
            if let Some(overrides) = section.get("overrides") {
                let Value::Table(workflows) = overrides else {
                    return Err(self.invalid("personas.overrides", "expected a table"));
                };
                for (workflow, roles) in workflows {
                    self.string_table(roles, &format!("personas.overrides.{workflow}"))?;
                }
            }
        }

        if let Some(value) = table.get("extensions")
            && !value.is_table()
        {
            return Err(self.invalid("extensions", "expected a table"));
        }

        Ok(())
    }

    fn string_table(&self, value: &Value, name: &str) -> Result<(), ConfigError> {
        let Value::Table(entries) = value else {
            return Err(self.invalid(name, "expected a table"));
        };
        match entries.iter().find(|(_, v)| !v.is_str()) {
            Some((key, _)) => Err(self.invalid(format!("{name}.{key}"), "expected a string")),
            None => Ok(()),
        }
    }

    fn section<'t>(
        &self,
        value: &'t Value,
        name: &str,
        allowed: &[&str],
    ) -> Result<&'t Table, ConfigError> {
        let Value::Table(section) = value else {
            return Err(self.invalid(name, "expected a table"));
        };
        for key in section.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(self.unknown(format!("{name}.{key}")));
            }
        }
        Ok(section)
    }
}
