//! Error types for the BasedAI server.

use thiserror::Error;

use basedai::CoreError;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error (config file, socket binding).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error. Fatal at start-up.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The question was empty or whitespace.
    #[error("Question must not be empty")]
    EmptyQuestion,

    /// Core orchestration error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `ServerError`.
pub type Result<T> = std::result::Result<T, ServerError>;

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}
