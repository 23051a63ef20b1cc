//! Conversion between addressed relay messages and wire frames.

use super::command::StompCommand;
use super::wire::{Frame, NUL};
use crate::convert::{CompositeConverter, PayloadConverter};
use crate::error::{Error, Result};
use crate::message::{Payload, RelayMessage};

/// Encodes outbound messages and decodes inbound frames.
#[derive(Debug, Clone, Default)]
pub struct StompCodec {
    converter: CompositeConverter,
}

impl StompCodec {
    pub const fn new(converter: CompositeConverter) -> Self {
        Self { converter }
    }

    /// Replace the payload converters.
    pub fn set_converters(&mut self, converter: CompositeConverter) {
        self.converter = converter;
    }

    /// Encode `message` as a `command` frame, NUL terminator included.
    ///
    /// The message's own command is ignored; the caller decides which
    /// command the frame carries. A NUL in any header or in the converted
    /// body is rejected, since the broker would end the frame there.
    pub fn encode(&self, message: &RelayMessage, command: StompCommand) -> Result<Vec<u8>> {
        if let Some((name, _)) = message
            .headers
            .iter()
            .find(|(name, value)| name.contains('\0') || value.contains('\0'))
        {
            return Err(Error::syntax(format!("NUL byte in header {name:?}")));
        }
        let body = self
            .converter
            .to_bytes(&message.payload, message.content_type())?;
        if body.contains(&NUL) {
            return Err(Error::syntax("NUL byte in frame body"));
        }
        let frame = Frame::new(command, message.headers.clone(), body);
        Ok(frame.encode())
    }

    /// Decode one NUL-stripped frame and address it to `session_id`.
    ///
    /// Returns `Ok(None)` for a heart-beat-only buffer.
    pub fn decode(&self, bytes: &[u8], session_id: &str) -> Result<Option<RelayMessage>> {
        Ok(Frame::decode(bytes)?.map(|frame| RelayMessage {
            session_id: session_id.to_string(),
            command: Some(frame.command),
            headers: frame.headers,
            payload: Payload::Bytes(frame.body),
        }))
    }
}
