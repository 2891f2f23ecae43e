//! Error types for namedeck-swipe
//!
//! Service-level errors use `Error`; chunk loading has its own cloneable `ChunkError`
//! so that every waiter of a coalesced fetch can receive the same failure.

use thiserror::Error;

/// Main error type for the catalog service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors surfaced from the shared library
    #[error(transparent)]
    Common(#[from] namedeck_common::Error),

    /// Dataset resource could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Dataset resource could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Deck manifest missing, malformed, or lacking the requested deck
    #[error("Deck error: {0}")]
    Deck(String),

    /// Swipe session errors
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

/// Convenience Result type using the service Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one chunk load attempt
///
/// Scoped to the chunk: nothing was installed, the chunk stays unloaded and a later
/// call retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("No chunk named '{0}'")]
    UnknownChunk(String),

    #[error("Fetching chunk '{chunk}' failed: {reason}")]
    Fetch { chunk: String, reason: String },

    #[error("Chunk '{chunk}' is malformed: {reason}")]
    Parse { chunk: String, reason: String },
}

impl ChunkError {
    pub fn chunk(&self) -> &str {
        match self {
            ChunkError::UnknownChunk(chunk) => chunk,
            ChunkError::Fetch { chunk, .. } => chunk,
            ChunkError::Parse { chunk, .. } => chunk,
        }
    }
}
