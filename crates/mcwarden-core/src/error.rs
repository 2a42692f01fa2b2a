//! Error types for `mcwarden` core library.

use thiserror::Error;

/// Result type alias using `mcwarden` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `mcwarden` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dispatch rule pattern failed to compile
    #[error("Invalid pattern for rule '{rule}': {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
