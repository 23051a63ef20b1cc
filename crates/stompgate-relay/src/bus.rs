//! Local bus endpoints seen by the relay.
//!
//! Inbound, the relay receives [`ClientEvent`]s. Outbound, it delivers
//! addressed messages through a [`ClientSink`]; each message names the
//! client session it is for.

use tokio::sync::mpsc;

use stompgate_core::RelayMessage;

use crate::error::RelayError;

/// Something the local bus asks the relay to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A command from a client session (CONNECT, SEND, ...).
    Message(RelayMessage),
    /// The client's local connection went away.
    ConnectionClosed { session_id: String },
}

impl ClientEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Message(message) => &message.session_id,
            Self::ConnectionClosed { session_id } => session_id,
        }
    }
}

/// Sender half of the server-to-client direction of the local bus.
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<RelayMessage>,
}

impl ClientSink {
    pub const fn new(tx: mpsc::Sender<RelayMessage>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the local bus drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Deliver a message, waiting for room if the bus is behind.
    pub async fn deliver(&self, message: RelayMessage) -> Result<(), RelayError> {
        let session_id = message.session_id.clone();
        self.tx
            .send(message)
            .await
            .map_err(|_| RelayError::BusClosed { session_id })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
