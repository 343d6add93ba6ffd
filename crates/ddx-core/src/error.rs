//! Error types for ddx-core
//!
//! Each engine has its own error enum so callers can match on exactly the
//! failures an operation can produce. [`Error`] wraps all of them for the
//! [`Project`](crate::Project) facade.

use std::path::PathBuf;

use crate::config::LayerSource;

/// Result type for ddx-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while loading, merging or persisting configuration layers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{layer} config {path} is malformed{}: {message}", line_suffix(*line))]
    ParseFailure {
        layer: LayerSource,
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("Unknown field '{key}' in {layer} config {path}{}", line_suffix(*line))]
    UnknownField {
        layer: LayerSource,
        path: PathBuf,
        key: String,
        line: Option<usize>,
    },

    #[error("Invalid value for '{key}' in {layer} config: {message}")]
    InvalidValue {
        layer: LayerSource,
        key: String,
        message: String,
    },

    #[error("Project is not initialized: {path} does not exist")]
    NotInitialized { path: PathBuf },

    #[error("Project is already initialized: {path} exists")]
    AlreadyInitialized { path: PathBuf },

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("Profile '{name}' already exists")]
    ProfileExists { name: String },

    #[error("Profile '{name}' is active; deactivate it first")]
    ProfileActive { name: String },

    #[error("Invalid profile name '{name}': {reason}")]
    InvalidProfileName { name: String, reason: String },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] ddx_fs::Error),
}

fn line_suffix(line: Option<usize>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

/// Placeholder expansion failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Unbound variable '{identifier}' on line {line}")]
    UnboundVariable { identifier: String, line: usize },
}

/// Resource application failures. Any of these means nothing was written.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("Apply aborted after {nodes_completed} node(s): {reason}")]
    Aborted {
        reason: String,
        nodes_completed: usize,
    },

    #[error("Permission denied writing {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Asset source {path} does not exist")]
    SourceNotFound { path: PathBuf },

    #[error("Invalid resource pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Update check failures. Recorded in the cache, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateCheckError {
    #[error("Update check failed: {0}")]
    NetworkFailure(String),

    #[error("Could not interpret release information: {0}")]
    ParseFailure(String),
}

/// Persona loading, binding and injection failures.
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("Persona '{name}' not found at {path}")]
    NotFound { name: String, path: PathBuf },

    #[error("Persona {path} is invalid: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Persona {path} exceeds {limit} bytes")]
    TooLarge { path: PathBuf, limit: u64 },

    #[error("No persona is bound to role '{role}'")]
    Unbound { role: String },

    #[error("At most {limit} personas can be loaded at once, got {count}")]
    TooMany { count: usize, limit: usize },

    #[error("{0}")]
    Validation(String),
}

/// Errors surfaced by the [`Project`](crate::Project) facade
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Sync(#[from] ddx_git::Error),

    #[error(transparent)]
    UpdateCheck(#[from] UpdateCheckError),

    #[error(transparent)]
    Blocks(#[from] ddx_blocks::Error),

    #[error(transparent)]
    Fs(#[from] ddx_fs::Error),

    #[error("Prompt {path} not found in the library")]
    PromptNotFound { path: String },

    #[error("No managed prompt region in {path}")]
    PromptNotInjected { path: PathBuf },

    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error("Failed to record applied revision: {0}")]
    Record(String),
}
