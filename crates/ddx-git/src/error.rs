//! Error types for ddx-git

/// Result type for ddx-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synchronizing the vendored library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Working tree has uncommitted changes: {}", paths.join(", "))]
    DirtyWorkingTree { paths: Vec<String> },

    #[error("Upstream advanced from {base} to {upstream}; pull before pushing")]
    StaleBase { base: String, upstream: String },

    #[error("Unresolved library conflicts: {}", paths.join(", "))]
    ConflictsPresent { paths: Vec<String> },

    #[error("No library has been pulled into '{prefix}' yet")]
    NotVendored { prefix: String },

    #[error("Invalid library prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Upstream {url} has no branch '{branch}'")]
    UpstreamRefNotFound { url: String, branch: String },

    #[error("Fetching {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Push of {refspec} was rejected: {message}")]
    PushRejected { refspec: String, message: String },

    #[error("Sync state at {path} is invalid: {message}")]
    State { path: String, message: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] ddx_fs::Error),
}
