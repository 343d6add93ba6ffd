//! Key-level merge for structured documents
//!
//! Rules, applied recursively from the document root:
//!
//! | existing | incoming | result |
//! |---|---|---|
//! | absent | any | incoming value added |
//! | table | table | tables merged key by key |
//! | any | any | existing value kept |
//!
//! Arrays are leaves: an existing array is kept whole, never concatenated.
//! A dotted path listed in the incoming document's top-level
//! [`OVERRIDE_KEY`] array replaces the existing value at that path with
//! the incoming one. The override list itself never reaches the output.

use std::collections::BTreeSet;

use crate::diff::merge_text;
use crate::error::{Error, Result};
use crate::format::Format;

/// Reserved top-level key listing dotted paths the incoming document forces.
pub const OVERRIDE_KEY: &str = "ddx_override";

/// What a merge produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Structured merge succeeded; no manual resolution needed
    Clean(String),
    /// Text merge wrote conflict markers into the content
    Conflicted { content: String, conflicts: usize },
}

impl MergeOutcome {
    pub fn content(&self) -> &str {
        match self {
            Self::Clean(content) => content,
            Self::Conflicted { content, .. } => content,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted { .. })
    }
}

/// Merge `incoming` into `existing` using the best strategy for `format`.
///
/// Structured formats that fail to parse on either side degrade to the
/// text merge.
pub fn merge(format: Option<Format>, existing: &str, incoming: &str) -> MergeOutcome {
    if let Some(format) = format.filter(Format::is_structured) {
        match merge_structured(format, existing, incoming) {
            Ok(content) => return MergeOutcome::Clean(content),
            Err(e) => {
                tracing::warn!(%format, error = %e, "Structured merge failed, using text merge");
            }
        }
    }

    let text = merge_text(existing, incoming);
    if text.is_clean() {
        MergeOutcome::Clean(text.content)
    } else {
        MergeOutcome::Conflicted {
            content: text.content,
            conflicts: text.conflicts,
        }
    }
}

/// Key-level merge of two documents of a structured `format`.
pub fn merge_structured(format: Format, existing: &str, incoming: &str) -> Result<String> {
    match format {
        Format::Json => merge_json(existing, incoming),
        Format::Yaml => merge_yaml(existing, incoming),
        Format::Toml => merge_toml(existing, incoming),
        other => Err(Error::Unstructured(other.to_string())),
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn override_paths<'a>(entries: impl Iterator<Item = Option<&'a str>>) -> BTreeSet<String> {
    entries.flatten().map(str::to_string).collect()
}

// JSON

fn merge_json(existing: &str, incoming: &str) -> Result<String> {
    use serde_json::Value;

    let mut base: Value =
        serde_json::from_str(existing).map_err(|e| Error::parse("JSON", e.to_string()))?;
    let overlay: Value =
        serde_json::from_str(incoming).map_err(|e| Error::parse("JSON", e.to_string()))?;

    let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut base, &overlay) else {
        return Err(Error::NotAMapping {
            format: "JSON".into(),
        });
    };

    let overrides = overlay_map
        .get(OVERRIDE_KEY)
        .and_then(Value::as_array)
        .map(|items| override_paths(items.iter().map(Value::as_str)))
        .unwrap_or_default();

    base_map.remove(OVERRIDE_KEY);
    merge_json_map(base_map, overlay_map, "", &overrides);

    let mut out = serde_json::to_string_pretty(&base)?;
    out.push('\n');
    Ok(out)
}

fn merge_json_map(
    base: &mut serde_json::Map<String, serde_json::Value>,
    overlay: &serde_json::Map<String, serde_json::Value>,
    prefix: &str,
    overrides: &BTreeSet<String>,
) {
    for (key, value) in overlay {
        if prefix.is_empty() && key == OVERRIDE_KEY {
            continue;
        }
        let path = child_path(prefix, key);
        match base.get_mut(key) {
            None => {
                base.insert(key.clone(), value.clone());
            }
            Some(existing) if overrides.contains(&path) => *existing = value.clone(),
            Some(serde_json::Value::Object(existing)) => {
                if let serde_json::Value::Object(incoming) = value {
                    merge_json_map(existing, incoming, &path, overrides);
                }
            }
            Some(_) => {}
        }
    }
}

// YAML

fn merge_yaml(existing: &str, incoming: &str) -> Result<String> {
    use serde_yaml::Value;

    let mut base: Value =
        serde_yaml::from_str(existing).map_err(|e| Error::parse("YAML", e.to_string()))?;
    let overlay: Value =
        serde_yaml::from_str(incoming).map_err(|e| Error::parse("YAML", e.to_string()))?;

    // An empty existing document parses as null; treat it as an empty mapping.
    if base.is_null() {
        base = Value::Mapping(serde_yaml::Mapping::new());
    }

    let (Value::Mapping(base_map), Value::Mapping(overlay_map)) = (&mut base, &overlay) else {
        return Err(Error::NotAMapping {
            format: "YAML".into(),
        });
    };

    let overrides = overlay_map
        .get(OVERRIDE_KEY)
        .and_then(Value::as_sequence)
        .map(|items| override_paths(items.iter().map(Value::as_str)))
        .unwrap_or_default();

    base_map.remove(OVERRIDE_KEY);
    merge_yaml_map(base_map, overlay_map, "", &overrides);

    Ok(serde_yaml::to_string(&base)?)
}

fn merge_yaml_map(
    base: &mut serde_yaml::Mapping,
    overlay: &serde_yaml::Mapping,
    prefix: &str,
    overrides: &BTreeSet<String>,
) {
    for (key, value) in overlay {
        let key_str = key.as_str();
        if prefix.is_empty() && key_str == Some(OVERRIDE_KEY) {
            continue;
        }
        let path = key_str.map(|k| child_path(prefix, k));
        match base.get_mut(key) {
            None => {
                base.insert(key.clone(), value.clone());
            }
            Some(existing) if path.as_ref().is_some_and(|p| overrides.contains(p)) => {
                *existing = value.clone();
            }
            Some(serde_yaml::Value::Mapping(existing)) => {
                if let (serde_yaml::Value::Mapping(incoming), Some(path)) = (value, &path) {
                    merge_yaml_map(existing, incoming, path, overrides);
                }
            }
            Some(_) => {}
        }
    }
}

// TOML

fn merge_toml(existing: &str, incoming: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut base: DocumentMut = existing
        .parse()
        .map_err(|e: toml_edit::TomlError| Error::parse("TOML", e.to_string()))?;
    let overlay: DocumentMut = incoming
        .parse()
        .map_err(|e: toml_edit::TomlError| Error::parse("TOML", e.to_string()))?;

    let overrides = overlay
        .get(OVERRIDE_KEY)
        .and_then(|item| item.as_array())
        .map(|items| override_paths(items.iter().map(|v| v.as_str())))
        .unwrap_or_default();

    let base_table = base.as_table_mut();
    base_table.remove(OVERRIDE_KEY);
    merge_toml_table(base_table, overlay.as_table(), "", &overrides);

    Ok(base.to_string())
}

fn merge_toml_table(
    base: &mut toml_edit::Table,
    overlay: &toml_edit::Table,
    prefix: &str,
    overrides: &BTreeSet<String>,
) {
    for (key, item) in overlay.iter() {
        if prefix.is_empty() && key == OVERRIDE_KEY {
            continue;
        }
        let path = child_path(prefix, key);
        if !base.contains_key(key) {
            base.insert(key, item.clone());
            continue;
        }
        let Some(existing) = base.get_mut(key) else {
            continue;
        };
        if overrides.contains(&path) {
            *existing = item.clone();
            continue;
        }
        match (existing, item) {
            (toml_edit::Item::Table(existing), toml_edit::Item::Table(incoming)) => {
                merge_toml_table(existing, incoming, &path, overrides);
            }
            (toml_edit::Item::Value(toml_edit::Value::InlineTable(existing)), toml_edit::Item::Value(toml_edit::Value::InlineTable(incoming))) => {
                merge_inline_table(existing, incoming, &path, overrides);
            }
            _ => {}
        }
    }
}

fn merge_inline_table(
    base: &mut toml_edit::InlineTable,
    overlay: &toml_edit::InlineTable,
    prefix: &str,
    overrides: &BTreeSet<String>,
) {
    for (key, value) in overlay.iter() {
        let path = child_path(prefix, key);
        match base.get_mut(key) {
            None => {
                base.insert(key, value.clone());
            }
            Some(existing) if overrides.contains(&path) => *existing = value.clone(),
            Some(toml_edit::Value::InlineTable(existing)) => {
                if let toml_edit::Value::InlineTable(incoming) = value {
                    merge_inline_table(existing, incoming, &path, overrides);
                }
            }
            Some(_) => {}
        }
    }
}
