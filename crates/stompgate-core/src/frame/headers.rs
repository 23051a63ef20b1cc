//! Ordered STOMP header collection.
//!
//! Order is preserved for wire reproduction and duplicate names are legal.
//! Lookups follow STOMP 1.2: the first occurrence of a name wins.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known header names.
pub mod names {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const MESSAGE: &str = "message";
}

/// Ordered list of `name:value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StompHeaders {
    entries: Vec<(String, String)>,
}

impl StompHeaders {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// Append a header, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Escape a header name or value for the wire.
pub(crate) fn escape(raw: &str, out: &mut Vec<u8>) {
    for byte in raw.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b':' => out.extend_from_slice(b"\\c"),
            other => out.push(other),
        }
    }
}

/// Reverse [`escape`]. Undefined escape sequences are a syntax error.
pub(crate) fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(Error::syntax(format!(
                    "Undefined header escape '\\{other}'"
                )));
            }
            None => return Err(Error::syntax("Dangling '\\' at end of header")),
        }
    }
    Ok(out)
}
