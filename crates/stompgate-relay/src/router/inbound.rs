//! Inbound reader: broker frames back to the local bus.
//!
//! One reader task runs per live session for the session's whole lifetime,
//! so the number of reader tasks equals the number of live sessions. There
//! is no pooling; that count is the relay's scalability ceiling.

use std::io;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use stompgate_core::frame::NUL;
use stompgate_core::{RelayMessage, StompCodec};

use crate::bus::ClientSink;
use crate::error::RelayError;
use crate::registry::{RelaySession, SessionInput, SessionRegistry};

/// Notification text sent to a client whose broker connection dropped.
pub const LOST_CONNECTION: &str = "Lost connection";

/// How a read loop ended.
#[derive(Debug)]
enum Exit {
    /// Session closed from our side (disconnect, client gone, write failure).
    Closed,
    /// Broker closed the socket. `pending` bytes of a partial frame are lost.
    PeerClosed { pending: usize },
    Io(io::Error),
    Malformed(RelayError),
    TooLarge { limit: usize },
    BusClosed,
}

/// Reads NUL-delimited frames from one session's socket.
pub struct InboundReader {
    session_id: String,
    epoch: u64,
    input: SessionInput,
    closed: CancellationToken,
    registry: SessionRegistry,
    sink: ClientSink,
    codec: Arc<StompCodec>,
    max_frame_bytes: usize,
}

impl InboundReader {
    pub fn new(
        session_id: impl Into<String>,
        session: &RelaySession,
        input: SessionInput,
        registry: SessionRegistry,
        sink: ClientSink,
        codec: Arc<StompCodec>,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            epoch: session.epoch(),
            input,
            closed: session.close_signal(),
            registry,
            sink,
            codec,
            max_frame_bytes,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Read until the session ends, then notify the client if the broker
    /// side failed and tear the session down.
    pub async fn run(mut self) {
        let exit = self.read_frames().await;
        let session_id = self.session_id.as_str();

        let notice = match exit {
            Exit::Closed => {
                debug!(session_id, "Relay session closed, reader stopping");
                None
            }
            Exit::PeerClosed { pending } => {
                info!(session_id, pending, "Broker closed connection");
                Some(LOST_CONNECTION.to_string())
            }
            Exit::Io(e) => {
                warn!(session_id, error = %e, "Socket error");
                Some(LOST_CONNECTION.to_string())
            }
            Exit::Malformed(e) => {
                warn!(session_id, error = %e, "Unrecoverable framing error");
                Some(format!("Malformed frame: {e}"))
            }
            Exit::TooLarge { limit } => {
                warn!(session_id, limit, "Inbound frame exceeds size limit");
                Some(format!("Frame too large (limit {limit} bytes)"))
            }
            Exit::BusClosed => {
                warn!(session_id, "Local bus closed, reader stopping");
                None
            }
        };

        if let Some(message) = notice {
            let error = RelayMessage::error(session_id, message);
            if let Err(e) = self.sink.deliver(error).await {
                debug!(session_id, error = %e, "Could not deliver error notification");
            }
        }

        self.registry.teardown(session_id, Some(self.epoch)).await;
    }

    async fn read_frames(&mut self) -> Exit {
        let mut frame = Vec::new();
        loop {
            let read = tokio::select! {
                biased;
                () = self.closed.cancelled() => return Exit::Closed,
                read = self.input.read_u8() => read,
            };
            match read {
                Ok(NUL) => {
                    let published = Self::publish(
                        &self.codec,
                        &self.sink,
                        &self.closed,
                        &self.session_id,
                        &frame,
                    );
                    if let Some(exit) = published.await {
                        return exit;
                    }
                    frame.clear();
                }
                // Heart-beats between frames.
                Ok(b'\n' | b'\r') if frame.is_empty() => {}
                Ok(byte) => {
                    if frame.len() >= self.max_frame_bytes {
                        return Exit::TooLarge {
                            limit: self.max_frame_bytes,
                        };
                    }
                    frame.push(byte);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Exit::PeerClosed {
                        pending: frame.len(),
                    };
                }
                Err(e) => return Exit::Io(e),
            }
        }
    }

    /// Decode one frame and hand it to the local bus.
    ///
    /// Takes the reader's shared parts rather than `&self`: the input half is
    /// not `Sync`, and the spawned future must stay `Send`.
    async fn publish(
        codec: &StompCodec,
        sink: &ClientSink,
        closed: &CancellationToken,
        session_id: &str,
        frame: &[u8],
    ) -> Option<Exit> {
        let message = match codec.decode(frame, session_id) {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(source) => {
                return Some(Exit::Malformed(RelayError::FrameSyntax {
                    session_id: session_id.to_string(),
                    source,
                }));
            }
        };
        trace!(session_id, command = ?message.command, "Received frame");
        tokio::select! {
            biased;
            () = closed.cancelled() => Some(Exit::Closed),
            delivered = sink.deliver(message) => delivered.err().map(|_| Exit::BusClosed),
        }
    }
}
