//! Wire representation of a single STOMP frame.

use super::command::StompCommand;
use super::headers::{self, StompHeaders};
use crate::error::{Error, Result};

/// End-of-frame marker.
pub const NUL: u8 = 0x00;

/// One STOMP frame: command, ordered headers and raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: StompCommand,
    pub headers: StompHeaders,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: StompCommand, headers: StompHeaders, body: Vec<u8>) -> Self {
        Self {
            command,
            headers,
            body,
        }
    }

    /// Serialize the frame including its trailing NUL.
    ///
    /// Header names and values must not contain NUL, and neither may the
    /// body; the reader would split the frame there.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        let escape = self.command.escapes_headers();
        for (name, value) in self.headers.iter() {
            if escape {
                headers::escape(name, &mut out);
                out.push(b':');
                headers::escape(value, &mut out);
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(NUL);
        out
    }

    /// Parse one frame whose NUL terminator has already been stripped.
    ///
    /// EOLs before the command line are broker heart-beats and are skipped.
    /// Returns `Ok(None)` when nothing but heart-beats remain.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let start = bytes
            .iter()
            .position(|&b| b != b'\n' && b != b'\r')
            .unwrap_or(bytes.len());
        let rest = &bytes[start..];
        if rest.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) =
            split_line(rest).ok_or_else(|| Error::syntax("Unterminated command line"))?;
        let command: StompCommand = utf8(command_line, "command line")?.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = StompHeaders::new();
        loop {
            let (line, tail) = split_line(rest).ok_or_else(|| {
                if rest.is_empty() {
                    Error::syntax("Missing blank line after headers")
                } else {
                    Error::syntax("Unterminated header line")
                }
            })?;
            rest = tail;
            if line.is_empty() {
                break;
            }
            let line = utf8(line, "header line")?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::syntax(format!("Header line without ':': '{line}'")))?;
            if escaped {
                headers.append(headers::unescape(name)?, headers::unescape(value)?);
            } else {
                headers.append(name, value);
            }
        }

        Ok(Some(Self {
            command,
            headers,
            body: rest.to_vec(),
        }))
    }

    fn encoded_len_hint(&self) -> usize {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(n, v)| n.len() + v.len() + 2)
            .sum();
        self.command.as_str().len() + header_bytes + self.body.len() + 3
    }
}

/// Split off one line terminated by `\n` or `\r\n`.
fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b'\n')?;
    let line = &bytes[..pos];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, &bytes[pos + 1..]))
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| Error::syntax(format!("Invalid UTF-8 in {what}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn strip_nul(mut bytes: Vec<u8>) -> Vec<u8> {
        assert_eq!(bytes.pop(), Some(NUL));
        bytes
    }

    #[test]
    fn encodes_command_headers_blank_line_body_and_nul() {
        let frame = Frame::new(
            StompCommand::Send,
            StompHeaders::new().with("destination", "/queue/a"),
            b"hello".to_vec(),
        );
        assert_eq!(frame.encode(), b"SEND\ndestination:/queue/a\n\nhello\0");
    }

    #[test]
    fn encodes_frame_without_headers_or_body() {
        let frame = Frame::new(StompCommand::Disconnect, StompHeaders::new(), Vec::new());
        assert_eq!(frame.encode(), b"DISCONNECT\n\n\0");
    }

    #[test]
    fn decodes_message_frame() {
        let frame = Frame::decode(b"MESSAGE\nbody-header:x\n\nhello")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.headers.get("body-header"), Some("x"));
        assert_eq!(frame.body, b"hello");
    }

    #[test]
    fn round_trip_preserves_order_and_duplicates() {
        let frame = Frame::new(
            StompCommand::Message,
            StompHeaders::new()
                .with("subscription", "sub-0")
                .with("x-tag", "first")
                .with("message-id", "007")
                .with("x-tag", "second"),
            b"{\"a\":1}".to_vec(),
        );
        let decoded = Frame::decode(&strip_nul(frame.encode())).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn escaped_headers_round_trip_except_for_connect() {
        let headers = StompHeaders::new().with("key:with:colons", "line\nbreak\\slash");
        let send = Frame::new(StompCommand::Send, headers.clone(), Vec::new());
        let encoded = send.encode();
        assert!(encoded.starts_with(b"SEND\nkey\\cwith\\ccolons:line\\nbreak\\\\slash\n"));
        assert_eq!(Frame::decode(&strip_nul(encoded)).unwrap().unwrap(), send);

        let connect = Frame::new(
            StompCommand::Connect,
            StompHeaders::new().with("passcode", "a\\b"),
            Vec::new(),
        );
        assert_eq!(connect.encode(), b"CONNECT\npasscode:a\\b\n\n\0");
        let decoded = Frame::decode(&strip_nul(connect.encode())).unwrap().unwrap();
        assert_eq!(decoded.headers.get("passcode"), Some("a\\b"));
    }

    #[test]
    fn header_value_may_contain_colon_in_connect_frames() {
        let frame = Frame::decode(b"CONNECTED\nserver:ActiveMQ/5.18:x\n\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame.headers.get("server"), Some("ActiveMQ/5.18:x"));
    }

    #[test]
    fn skips_heartbeat_eols_and_accepts_crlf() {
        let frame = Frame::decode(b"\n\r\nRECEIPT\r\nreceipt-id:77\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, StompCommand::Receipt);
        assert_eq!(frame.headers.get("receipt-id"), Some("77"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn heartbeat_only_buffer_is_not_a_frame() {
        assert!(Frame::decode(b"\n\n").unwrap().is_none());
        assert!(Frame::decode(b"").unwrap().is_none());
    }

    #[test]
    fn body_may_contain_newlines_and_arbitrary_bytes() {
        let frame = Frame::decode(b"MESSAGE\n\nline1\n\nline2\xff").unwrap().unwrap();
        assert_eq!(frame.body, b"line1\n\nline2\xff");
    }

    #[test]
    fn malformed_frames_are_syntax_errors() {
        for bytes in [
            &b"MESSAGE"[..],
            b"MESSAGE\nfoo:bar\n",
            b"MESSAGE\nfoo:bar",
            b"MESSAGE\nnocolon\n\n",
            b"BOGUS\n\n",
            b"SEND\nbad:esc\\t\n\n",
            b"\xff\xfe\n\n",
        ] {
            match Frame::decode(bytes) {
                Err(Error::FrameSyntax(_)) => {}
                other => panic!("expected syntax error for {bytes:?}, got {other:?}"),
            }
        }
    }
}
