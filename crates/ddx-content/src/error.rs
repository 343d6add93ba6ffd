//! Error types for ddx-content

/// Result type for ddx-content operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ddx-content operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse {format} content: {message}")]
    ParseError { format: String, message: String },

    #[error("{format} document root is not a mapping")]
    NotAMapping { format: String },

    #[error("Format {0} has no structured merge")]
    Unstructured(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            format: format.into(),
            message: message.into(),
        }
    }
}
