//! Error types for the agency node.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed body or identifier.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate agent identity on create.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Local delivery queue is full.
    #[error("Congested: {0}")]
    Congested(String),

    /// Receiver could not be resolved locally or remotely.
    #[error("Undeliverable: {0}")]
    Undeliverable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn internal(s: impl Into<String>) -> Self {
        Error::Internal(s.into())
    }
}
