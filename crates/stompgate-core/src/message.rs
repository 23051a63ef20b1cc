//! Addressed messages exchanged with the local bus.

use serde_json::Value;

use crate::frame::{StompCommand, StompHeaders, names};

/// Application payload carried by a [`RelayMessage`].
///
/// Messages coming from the local bus may carry text or JSON that still has
/// to be converted; messages decoded from the broker always carry bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl Payload {
    /// Raw bytes, when the payload is already encoded.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Empty => Some(&[]),
            Self::Text(_) | Self::Json(_) => None,
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A message addressed to or from one client session.
///
/// `session_id` and `command` are routing metadata and never reach the wire;
/// `headers` are the STOMP headers written to or read from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub session_id: String,
    /// Protocol command. `None` is forwarded as SEND.
    pub command: Option<StompCommand>,
    pub headers: StompHeaders,
    pub payload: Payload,
}

impl RelayMessage {
    pub fn new(session_id: impl Into<String>, command: Option<StompCommand>) -> Self {
        Self {
            session_id: session_id.into(),
            command,
            headers: StompHeaders::new(),
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Synthetic ERROR notification for a client whose relay failed.
    pub fn error(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(session_id, Some(StompCommand::Error)).with_header(names::MESSAGE, message)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }
}
