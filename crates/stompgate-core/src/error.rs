//! Error types for `StompGate` core library.

use thiserror::Error;

/// Result type alias using `StompGate` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `StompGate` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bytes could not be parsed as a STOMP frame
    #[error("Frame syntax error: {0}")]
    FrameSyntax(String),

    /// Payload could not be converted to bytes
    #[error("Payload conversion error: {0}")]
    Conversion(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn syntax(reason: impl Into<String>) -> Self {
        Self::FrameSyntax(reason.into())
    }
}
