//! Outbound forwarder: local messages to broker frames.

use std::sync::Arc;

use tracing::{trace, warn};

use stompgate_core::{RelayMessage, StompCodec, StompCommand};

use crate::error::RelayError;
use crate::registry::SessionRegistry;

/// Encodes messages and writes them to the matching session's socket.
#[derive(Clone)]
pub struct OutboundForwarder {
    registry: SessionRegistry,
    codec: Arc<StompCodec>,
}

impl OutboundForwarder {
    pub const fn new(registry: SessionRegistry, codec: Arc<StompCodec>) -> Self {
        Self { registry, codec }
    }

    /// Forward `message` to its session's broker connection as `command`.
    ///
    /// An unknown session is reported and the message dropped. An encoding
    /// failure (no matching converter, or a NUL in a header or the body)
    /// drops the message but keeps the session, since nothing was written.
    /// A write failure tears the session down; it is never retried.
    pub async fn forward(
        &self,
        message: &RelayMessage,
        command: StompCommand,
    ) -> Result<(), RelayError> {
        let session_id = message.session_id.as_str();
        let session = self.registry.lookup(session_id).await?;

        let bytes = self
            .codec
            .encode(message, command)
            .map_err(|source| RelayError::Conversion {
                session_id: session_id.to_string(),
                source,
            })?;

        trace!(session_id, %command, len = bytes.len(), "Forwarding frame");

        if let Err(source) = session.write_frame(&bytes).await {
            warn!(session_id, %command, error = %source, "Couldn't forward frame");
            self.registry
                .teardown(session_id, Some(session.epoch()))
                .await;
            return Err(RelayError::SocketIo {
                session_id: session_id.to_string(),
                source,
            });
        }
        Ok(())
    }

    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stompgate_core::convert::CompositeConverter;
    use tokio::io::{AsyncReadExt, DuplexStream};

    use crate::registry::RelaySession;

    async fn setup(session_id: &str) -> (OutboundForwarder, DuplexStream) {
        let registry = SessionRegistry::new();
        let (near, far) = tokio::io::duplex(4096);
        let (session, _input) = RelaySession::new(near);
        registry.create(session_id, session).await.unwrap();
        let forwarder = OutboundForwarder::new(registry, Arc::new(StompCodec::default()));
        (forwarder, far)
    }

    #[tokio::test]
    async fn frames_reach_the_wire_in_call_order() {
        let (forwarder, mut broker) = setup("s1").await;

        let subscribe = RelayMessage::new("s1", Some(StompCommand::Subscribe))
            .with_header("id", "0")
            .with_header("destination", "/topic/a");
        let send = RelayMessage::new("s1", None)
            .with_header("destination", "/topic/a")
            .with_payload("one");
        let unsubscribe = RelayMessage::new("s1", None).with_header("id", "0");

        forwarder
            .forward(&subscribe, StompCommand::Subscribe)
            .await
            .unwrap();
        forwarder.forward(&send, StompCommand::Send).await.unwrap();
        forwarder
            .forward(&unsubscribe, StompCommand::Unsubscribe)
            .await
            .unwrap();

        let expected: &[u8] = b"SUBSCRIBE\nid:0\ndestination:/topic/a\n\n\0\
SEND\ndestination:/topic/a\n\none\0\
UNSUBSCRIBE\nid:0\n\n\0";
        let mut wire = vec![0u8; expected.len()];
        broker.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found_without_side_effects() {
        let (forwarder, mut broker) = setup("s1").await;

        let msg = RelayMessage::new("ghost", None).with_payload("x");
        let err = forwarder.forward(&msg, StompCommand::Send).await.unwrap_err();
        assert!(matches!(err, RelayError::SessionNotFound { ref session_id } if session_id == "ghost"));

        assert_eq!(forwarder.registry().session_ids().await, vec!["s1"]);
        let mut buf = [0u8; 1];
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), broker.read(&mut buf))
                .await;
        assert!(pending.is_err(), "nothing should have been written");
    }

    #[tokio::test]
    async fn write_failure_tears_the_session_down() {
        let (forwarder, broker) = setup("s1").await;
        drop(broker);

        let msg = RelayMessage::new("s1", None).with_payload("lost");
        let err = forwarder.forward(&msg, StompCommand::Send).await.unwrap_err();
        assert!(matches!(err, RelayError::SocketIo { .. }));
        assert!(!forwarder.registry().contains("s1").await);

        let again = forwarder.forward(&msg, StompCommand::Send).await.unwrap_err();
        assert!(matches!(again, RelayError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn conversion_failure_keeps_the_session() {
        let registry = SessionRegistry::new();
        let (near, _far) = tokio::io::duplex(64);
        registry
            .create("s1", RelaySession::new(near).0)
            .await
            .unwrap();
        let codec = StompCodec::new(CompositeConverter::new(Vec::new()));
        let forwarder = OutboundForwarder::new(registry, Arc::new(codec));

        let msg = RelayMessage::new("s1", None).with_payload("x");
        let err = forwarder.forward(&msg, StompCommand::Send).await.unwrap_err();
        assert!(matches!(err, RelayError::Conversion { .. }));
        assert!(forwarder.registry().contains("s1").await);
    }

    #[tokio::test]
    async fn embedded_nul_is_rejected_before_writing() {
        let (forwarder, mut broker) = setup("s1").await;

        let msg = RelayMessage::new("s1", None)
            .with_header("destination", "/q\0evil")
            .with_payload("body\0tail");
        let err = forwarder.forward(&msg, StompCommand::Send).await.unwrap_err();
        assert!(matches!(err, RelayError::Conversion { .. }));
        assert!(forwarder.registry().contains("s1").await);

        let mut buf = [0u8; 1];
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), broker.read(&mut buf))
                .await;
        assert!(pending.is_err(), "nothing should have been written");

        let ok = RelayMessage::new("s1", None)
            .with_header("destination", "/q")
            .with_payload("fine");
        forwarder.forward(&ok, StompCommand::Send).await.unwrap();
        let expected: &[u8] = b"SEND\ndestination:/q\n\nfine\0";
        let mut wire = vec![0u8; expected.len()];
        broker.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_forwards_never_interleave_frames() {
        const SENDERS: u8 = 8;
        const BODY_LEN: usize = 8 * 1024;

        let registry = SessionRegistry::new();
        // Far smaller than one frame, so every write blocks part-way.
        let (near, mut broker) = tokio::io::duplex(256);
        registry
            .create("s1", RelaySession::new(near).0)
            .await
            .unwrap();
        let forwarder = OutboundForwarder::new(registry, Arc::new(StompCodec::default()));

        let mut tasks = Vec::new();
        for i in 0..SENDERS {
            let forwarder = forwarder.clone();
            tasks.push(tokio::spawn(async move {
                let marker = char::from(b'a' + i);
                let msg = RelayMessage::new("s1", None)
                    .with_header("sender", marker.to_string())
                    .with_payload(marker.to_string().repeat(BODY_LEN));
                forwarder.forward(&msg, StompCommand::Send).await.unwrap();
            }));
        }

        let mut wire = Vec::new();
        let mut chunk = [0u8; 1024];
        while wire.iter().filter(|&&b| b == 0).count() < usize::from(SENDERS) {
            let read = broker.read(&mut chunk);
            let n = tokio::time::timeout(std::time::Duration::from_secs(5), read)
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "session closed early");
            wire.extend_from_slice(&chunk[..n]);
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut seen = Vec::new();
        for frame in wire.split(|&b| b == 0).filter(|f| !f.is_empty()) {
            let text = std::str::from_utf8(frame).unwrap();
            let (head, body) = text.split_once("\n\n").unwrap();
            let marker = head
                .lines()
                .find_map(|line| line.strip_prefix("sender:"))
                .unwrap();
            assert_eq!(head.lines().next(), Some("SEND"));
            assert_eq!(body.len(), BODY_LEN);
            assert!(
                body.chars().all(|c| c.to_string() == marker),
                "frame {marker} interleaved"
            );
            seen.push(marker.to_string());
        }
        seen.sort();
        let expected: Vec<String> = (0..SENDERS)
            .map(|i| char::from(b'a' + i).to_string())
            .collect();
        assert_eq!(seen, expected);
    }
}
