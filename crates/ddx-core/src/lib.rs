//! Core orchestration layer for DDx
//!
//! This crate sits on top of the filesystem, region, content-merge and git
//! crates and implements:
//!
//! - **Configuration resolution**: layered TOML config with profiles and provenance
//! - **Substitution**: `{{name}}` / `{{name || default}}` placeholders
//! - **Apply engine**: render library assets into a project with skip/overwrite/merge/ask
//! - **Library sync**: pull and contribute the vendored library through [`ddx_git`]
//! - **Update checks**: cache-throttled release lookup
//! - **Prompt injection**: keep a meta-prompt region in step with the library
//! - **Personas**: load library personas and inject the ones bound to project roles
//!
//! # Architecture
//!
//! ```text
//!                          Project
//!                             |
//!   +--------+--------+-------+-+---------+---------+--------+
//!   |        |        |         |         |         |        |
//! config substitute  apply   update    prompt    persona  ddx-git
//!   |                  |                  |         |
//! ddx-fs          ddx-content           ddx-blocks -+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ddx_core::{Project, config::EnvSnapshot};
//!
//! let project = Project::open("/path/to/project", EnvSnapshot::from_process());
//! let config = project.resolve()?;
//! let outcome = project.update(None)?;
//! if outcome.reapply_needed {
//!     println!("library moved to {}", outcome.sync.revision());
//! }
//! ```

pub mod apply;
pub mod config;
pub mod error;
pub mod logging;
pub mod persona;
pub mod project;
pub mod prompt;
pub mod substitute;
pub mod update;

pub use apply::{ApplyOptions, ApplyReport, AssetTree, Strategy, apply};
pub use config::{ConfigResolver, EnvSnapshot, ProfileStore, ResolvedConfig};
pub use error::{
    ApplyError, ConfigError, Error, PersonaError, Result, SubstitutionError, UpdateCheckError,
};
pub use project::{AppliedRecord, AppliedTemplate, Project, UpdateOutcome};
pub use persona::{Persona, PersonaInjector, PersonaLibrary};
pub use prompt::PromptInjector;
pub use substitute::{Bindings, Strictness, substitute};
pub use update::{UpdateCheckResult, UpdateChecker};
