//! Relay error types.
//!
//! Every variant names the session it concerns; no failure here is
//! process-wide.

/// Errors surfaced by relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Could not connect session {session_id} to broker at {addr}: {reason}")]
    ConnectionEstablishment {
        session_id: String,
        addr: String,
        reason: String,
    },

    #[error("Relay session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Relay session already exists: {session_id}")]
    SessionAlreadyExists { session_id: String },

    #[error("Malformed frame on session {session_id}: {source}")]
    FrameSyntax {
        session_id: String,
        #[source]
        source: stompgate_core::Error,
    },

    #[error("Socket I/O failure on session {session_id}: {source}")]
    SocketIo {
        session_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not convert payload for session {session_id}: {source}")]
    Conversion {
        session_id: String,
        #[source]
        source: stompgate_core::Error,
    },

    #[error("Local bus closed, dropping message for session {session_id}")]
    BusClosed { session_id: String },
}

impl RelayError {
    /// Session the error concerns.
    pub fn session_id(&self) -> &str {
        match self {
            Self::ConnectionEstablishment { session_id, .. }
            | Self::SessionNotFound { session_id }
            | Self::SessionAlreadyExists { session_id }
            | Self::FrameSyntax { session_id, .. }
            | Self::SocketIo { session_id, .. }
            | Self::Conversion { session_id, .. }
            | Self::BusClosed { session_id } => session_id,
        }
    }
}
