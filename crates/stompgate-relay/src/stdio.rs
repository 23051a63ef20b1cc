//! Newline-delimited JSON adapter for driving the relay over stdio.
//!
//! Inbound lines:
//! `{"type":"message","session_id":"s1","command":"SEND","headers":[["destination","/q"]],"payload":"hi"}`
//! and `{"type":"closed","session_id":"s1"}`.
//!
//! Outbound lines carry the decoded frame with its body as a UTF-8 `body`
//! string, or as `body_bytes` when the body is not valid UTF-8.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stompgate_core::{Payload, RelayMessage, Result, StompCommand, StompHeaders};

use crate::bus::ClientEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundLine {
    Message {
        session_id: String,
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        headers: StompHeaders,
        #[serde(default)]
        payload: Option<Value>,
    },
    Closed {
        session_id: String,
    },
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'static str>,
    headers: &'a StompHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_bytes: Option<&'a [u8]>,
}

/// Parse one inbound line into a client event.
pub fn parse_event(line: &str) -> Result<ClientEvent> {
    let event = match serde_json::from_str::<InboundLine>(line)? {
        InboundLine::Message {
            session_id,
            command,
            headers,
            payload,
        } => {
            let command = command
                .as_deref()
                .map(str::parse::<StompCommand>)
                .transpose()?;
            let payload = match payload {
                None | Some(Value::Null) => Payload::Empty,
                Some(Value::String(text)) => Payload::Text(text),
                Some(value) => Payload::Json(value),
            };
            ClientEvent::Message(RelayMessage {
                session_id,
                command,
                headers,
                payload,
            })
        }
        InboundLine::Closed { session_id } => ClientEvent::ConnectionClosed { session_id },
    };
    Ok(event)
}

/// Render an outbound message as one JSON line (no trailing newline).
pub fn render_message(message: &RelayMessage) -> Result<String> {
    let (body, body_bytes) = match &message.payload {
        Payload::Empty => (Some(String::new()), None),
        Payload::Text(text) => (Some(text.clone()), None),
        Payload::Json(value) => (Some(value.to_string()), None),
        Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (None, Some(bytes.as_slice())),
        },
    };
    let line = OutboundLine {
        session_id: &message.session_id,
        command: message.command.map(StompCommand::as_str),
        headers: &message.headers,
        body,
        body_bytes,
    };
    Ok(serde_json::to_string(&line)?)
}
