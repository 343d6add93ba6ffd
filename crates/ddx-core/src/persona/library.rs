//! Discovering personas in the vendored library.

use ddx_fs::{NormalizedPath, io};
use walkdir::WalkDir;

use super::model::Persona;
use crate::error::PersonaError;
use crate::Result;

/// Personas live under this directory of the vendored library.
pub const PERSONAS_DIR: &str = "personas";
pub const PERSONA_EXTENSION: &str = "md";
/// Larger persona files are refused.
pub const MAX_PERSONA_FILE_SIZE: usize = 1024 * 1024;

/// The `<library>/personas/*.md` collection.
#[derive(Debug, Clone)]
pub struct PersonaLibrary {
    dir: NormalizedPath,
}

impl PersonaLibrary {
    /// Collection rooted at `dir` itself.
    pub fn new(dir: NormalizedPath) -> Self {
        Self { dir }
    }

    /// Collection inside vendored library `library`.
    pub fn in_library(library: &NormalizedPath) -> Self {
        Self::new(library.join(PERSONAS_DIR))
    }

    pub fn dir(&self) -> &NormalizedPath {
        &self.dir
    }

    /// Load persona `name` from `<dir>/<name>.md`.
    ///
    /// # Errors
    ///
    /// - [`PersonaError::NotFound`] when the file does not exist
    /// - [`PersonaError::TooLarge`] above [`MAX_PERSONA_FILE_SIZE`]
    /// - [`PersonaError::Invalid`] for a malformed document
    pub fn load(&self, name: &str) -> Result<Persona> {
        ddx_fs::validate_path_identifier(name)?;
        let path = self.dir.join(&format!("{name}.{PERSONA_EXTENSION}"));
        let Some(text) = io::read_text_optional(&path)? else {
            return Err(PersonaError::NotFound {
                name: name.to_string(),
                path: path.to_native(),
            }
            .into());
        };
        if text.len() > MAX_PERSONA_FILE_SIZE {
            return Err(PersonaError::TooLarge {
                path: path.to_native(),
                limit: MAX_PERSONA_FILE_SIZE as u64,
            }
            .into());
        }
        Ok(Persona::parse(&path.to_native(), &text)?)
    }

    /// Every valid persona, sorted by file name. Invalid files are
    /// skipped with a warning; a missing directory is an empty library.
    pub fn list(&self) -> Result<Vec<Persona>> {
        let native = self.dir.to_native();
        if !native.is_dir() {
            return Ok(Vec::new());
        }

        let mut personas = Vec::new();
        for entry in WalkDir::new(&native)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ddx_fs::Error::io(&native, e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(PERSONA_EXTENSION)
            {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(name) {
                Ok(persona) => personas.push(persona),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping invalid persona"),
            }
        }
        Ok(personas)
    }

    /// Personas that can fill `role`.
    pub fn find_by_role(&self, role: &str) -> Result<Vec<Persona>> {
        if role.trim().is_empty() {
            return Err(PersonaError::Validation("role must not be empty".into()).into());
        }
        Ok(self.list()?.into_iter().filter(|p| p.has_role(role)).collect())
    }

    /// Personas carrying every tag in `tags`.
    pub fn find_by_tags(&self, tags: &[&str]) -> Result<Vec<Persona>> {
        if tags.is_empty() {
            return Err(PersonaError::Validation("at least one tag is required".into()).into());
        }
        Ok(self.list()?.into_iter().filter(|p| p.has_tags(tags)).collect())
    }
}
