//! Personas: reusable AI personalities bound to project roles.
//!
//! A [`Persona`] is a markdown file with YAML frontmatter under the
//! library's `personas/` directory, discovered through a
//! [`PersonaLibrary`]. Projects bind roles to persona names in the
//! `[personas]` config section, and a [`PersonaInjector`] writes the bound
//! personas into the `PERSONAS` region of a project document.

mod injector;
mod library;
mod model;

pub use injector::{
    MAX_LOADED_PERSONAS, PERSONAS_FOOTER, PERSONAS_HEADER, PersonaInjector, REGION_NAME,
};
pub use library::{MAX_PERSONA_FILE_SIZE, PERSONA_EXTENSION, PERSONAS_DIR, PersonaLibrary};
pub use model::{MAX_ROLES, MAX_TAGS, Persona};
