//! Error types for ddx-blocks

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Region '{start}' opened on line {line} is never closed")]
    Unterminated { start: String, line: usize },

    #[error("Region markers must be non-empty and distinct")]
    InvalidMarkers,

    #[error(transparent)]
    Regex(#[from] regex::Error),
}
