//! Editing persona bindings in the project configuration file.
//!
//! Edits go through `toml_edit` so comments and layout of
//! `.ddx/config.toml` survive.

use ddx_fs::{DdxPath, NormalizedPath, io};
use toml_edit::{DocumentMut, Item, Table};

use super::layer::{ConfigLayer, LayerSource, line_of};
use crate::error::ConfigError;

fn implicit_table() -> Item {
    let mut table = Table::new();
    table.set_implicit(true);
    Item::Table(table)
}

fn check_name(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            layer: LayerSource::Project,
            key: key.to_string(),
            message: "must not be empty".into(),
        });
    }
    Ok(())
}

/// Apply `edit` to the project config. Writes only when `edit` reports
/// a change and the result is still a valid layer.
fn edit_project_config(
    root: &NormalizedPath,
    edit: impl FnOnce(&mut DocumentMut) -> bool,
) -> Result<bool, ConfigError> {
    let path = root.join(DdxPath::ProjectConfig.as_str());
    let native = path.to_native();
    let Some(text) = io::read_text_optional(&path)? else {
        return Err(ConfigError::NotInitialized { path: native });
    };
    ConfigLayer::parse(&LayerSource::Project, &native, &text)?;

    let mut doc: DocumentMut = text.parse().map_err(|e: toml_edit::TomlError| {
        ConfigError::ParseFailure {
            layer: LayerSource::Project,
            path: native.clone(),
            line: e.span().map(|span| line_of(&text, span.start)),
            message: e.message().to_string(),
        }
    })?;
    if !edit(&mut doc) {
        return Ok(false);
    }

    let updated = doc.to_string();
    ConfigLayer::parse(&LayerSource::Project, &native, &updated)?;
    io::write_atomic(&path, updated.as_bytes())?;
    Ok(true)
}

/// Bind `persona` to `role` in the project's `[personas.bindings]`.
pub fn set_persona_binding(
    root: &NormalizedPath,
    role: &str,
    persona: &str,
) -> Result<(), ConfigError> {
    check_name("personas.bindings", role)?;
    check_name(&format!("personas.bindings.{role}"), persona)?;

    edit_project_config(root, |doc| {
        let Some(bindings) = doc
            .entry("personas")
            .or_insert_with(implicit_table)
            .as_table_like_mut()
            .and_then(|personas| {
                personas
                    .entry("bindings")
                    .or_insert(toml_edit::table())
                    .as_table_like_mut()
            })
        else {
            return false;
        };
        if bindings.get(role).and_then(Item::as_str) == Some(persona) {
            return false;
        }
        bindings.insert(role, toml_edit::value(persona));
        true
    })?;
    tracing::info!(role, persona, "Persona bound");
    Ok(())
}

/// Drop the project binding for `role`. Returns whether one existed.
pub fn remove_persona_binding(root: &NormalizedPath, role: &str) -> Result<bool, ConfigError> {
    check_name("personas.bindings", role)?;
    edit_project_config(root, |doc| {
        doc.get_mut("personas")
            .and_then(Item::as_table_like_mut)
            .and_then(|personas| personas.get_mut("bindings"))
            .and_then(Item::as_table_like_mut)
            .and_then(|bindings| bindings.remove(role))
            .is_some()
    })
}
