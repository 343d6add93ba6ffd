//! Layered configuration and profiles
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged from these sources (later sources override earlier):
//!
//! 1. **Defaults** - compiled in
//! 2. **Global** - `<config_dir>/ddx/config.toml`
//! 3. **Project** - `.ddx/config.toml` (required)
//! 4. **Environment** - `.ddx/environments/<DDX_ENV>.toml`
//! 5. **Profile** - `.ddx/profiles/<name>.toml` when a profile is active
//! 6. **Process environment** - `DDX_REPOSITORY_URL`, `DDX_VAR_<NAME>`, ...
//!
//! # Example
//!
//! ```ignore
//! use ddx_core::config::{ConfigResolver, EnvSnapshot};
//!
//! let resolver = ConfigResolver::new("/path/to/project", EnvSnapshot::from_process());
//! let config = resolver.resolve_from_env()?;
//! let port = config.variables.get("port");
//! ```

mod bindings;
mod env;
mod layer;
mod profile;
mod resolver;

pub use bindings::{remove_persona_binding, set_persona_binding};
pub use env::{
    ENV_DISABLE_UPDATE_CHECK, ENV_ENVIRONMENT, ENV_LIBRARY_PATH, ENV_PROFILE,
    ENV_REPOSITORY_BRANCH, ENV_REPOSITORY_URL, ENV_VAR_PREFIX, EnvSnapshot,
};
pub use layer::{
    ConfigLayer, LayerSource, PersonaSection, RepositorySection, ResourceRule, UpdateCheckSection,
};
pub use profile::{PROFILE_VARIABLE, ProfileDifference, ProfileStore, init_project};
pub use resolver::{
    ConfigResolver, DEFAULT_BRANCH, DEFAULT_LIBRARY_PATH, DEFAULT_REPOSITORY_URL,
    ResolvedConfig, UpdateCheckPolicy,
};
