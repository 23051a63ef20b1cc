//! Relay controller: dispatches local bus commands to broker sessions.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use stompgate_core::config::{BrokerConfig, RelaySettings};
use stompgate_core::{Config, RelayMessage, StompCodec, StompCommand};

use crate::bus::{ClientEvent, ClientSink};
use crate::error::RelayError;
use crate::registry::{RelaySession, SessionRegistry};
use crate::router::{InboundReader, OutboundForwarder};

/// Entry point for everything the local bus asks of the relay.
///
/// The controller is the only component that creates sessions. Commands
/// are expected to arrive serialized per session; writes are additionally
/// serialized inside each session.
pub struct RelayController {
    broker: BrokerConfig,
    settings: RelaySettings,
    registry: SessionRegistry,
    forwarder: OutboundForwarder,
    codec: Arc<StompCodec>,
    sink: ClientSink,
}

impl RelayController {
    pub fn new(config: &Config, sink: ClientSink) -> Self {
        Self::with_codec(config, sink, StompCodec::default())
    }

    /// Use a codec with custom payload converters.
    pub fn with_codec(config: &Config, sink: ClientSink, codec: StompCodec) -> Self {
        let registry = SessionRegistry::new();
        let codec = Arc::new(codec);
        Self {
            broker: config.broker.clone(),
            settings: config.relay.clone(),
            forwarder: OutboundForwarder::new(registry.clone(), Arc::clone(&codec)),
            registry,
            codec,
            sink,
        }
    }

    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn handle(&self, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::Message(message) => self.handle_message(message).await,
            ClientEvent::ConnectionClosed { session_id } => {
                self.connection_closed(&session_id).await;
                Ok(())
            }
        }
    }

    /// Dispatch one client command. A message without a command is a SEND.
    pub async fn handle_message(&self, message: RelayMessage) -> Result<(), RelayError> {
        match message.command {
            Some(command) if command.is_connect() => self.connect(&message, command).await,
            Some(StompCommand::Disconnect) => self.disconnect(&message).await,
            None => self.forwarder.forward(&message, StompCommand::Send).await,
            // SEND, SUBSCRIBE, UNSUBSCRIBE and anything else keep their own token.
            Some(command) => self.forwarder.forward(&message, command).await,
        }
    }

    /// Open a broker connection for a new session, start its reader and
    /// forward the CONNECT frame.
    async fn connect(&self, message: &RelayMessage, command: StompCommand) -> Result<(), RelayError> {
        let session_id = message.session_id.as_str();
        if self.registry.contains(session_id).await {
            return Err(RelayError::SessionAlreadyExists {
                session_id: session_id.to_string(),
            });
        }

        let stream = self.open_socket(session_id).await?;
        let (session, input) = RelaySession::from_tcp(stream);
        // A concurrent CONNECT may have won; dropping ours closes its socket.
        let session = self.registry.create(session_id, session).await?;

        // Detached: the reader ends when the session closes.
        let _reader = InboundReader::new(
            session_id,
            &session,
            input,
            self.registry.clone(),
            self.sink.clone(),
            Arc::clone(&self.codec),
            self.settings.max_frame_bytes,
        )
        .spawn();

        info!(
            session_id,
            broker = %self.broker.address(),
            peer = ?session.peer(),
            "Relay session connected"
        );
        self.forwarder.forward(message, command).await
    }

    async fn open_socket(&self, session_id: &str) -> Result<TcpStream, RelayError> {
        let addr = self.broker.address();
        let failure = |reason: String| RelayError::ConnectionEstablishment {
            session_id: session_id.to_string(),
            addr: addr.clone(),
            reason,
        };

        let stream = timeout(self.broker.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| failure("connect timed out".to_string()))?
            .map_err(|e| failure(e.to_string()))?;

        if self.broker.tcp_nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            debug!(session_id, error = %e, "Could not set TCP_NODELAY");
        }
        Ok(stream)
    }

    /// Forward DISCONNECT, then close the session.
    async fn disconnect(&self, message: &RelayMessage) -> Result<(), RelayError> {
        let result = self
            .forwarder
            .forward(message, StompCommand::Disconnect)
            .await;
        self.registry.teardown(&message.session_id, None).await;
        result
    }

    /// The client's local connection closed; drop its relay session.
    pub async fn connection_closed(&self, session_id: &str) {
        debug!(session_id, "Client connection closed, clearing relay session");
        self.registry.teardown(session_id, None).await;
    }

    /// Tear down every live session.
    pub async fn shutdown(&self) {
        let closed = self.registry.teardown_all().await;
        if closed > 0 {
            info!(closed, "Closed live relay sessions on shutdown");
        }
    }
}
