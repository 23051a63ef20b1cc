//! Payload conversion from application objects to body bytes.
//!
//! Converters are consulted in order; the first one that accepts the
//! payload and content type produces the body.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::Payload;

/// Turns an application payload into frame body bytes.
pub trait PayloadConverter: Send + Sync {
    fn can_convert(&self, payload: &Payload, content_type: Option<&str>) -> bool;

    fn to_bytes(&self, payload: &Payload, content_type: Option<&str>) -> Result<Vec<u8>>;
}

/// Passes raw bytes (and empty payloads) through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesConverter;

impl PayloadConverter for BytesConverter {
    fn can_convert(&self, payload: &Payload, _content_type: Option<&str>) -> bool {
        matches!(payload, Payload::Bytes(_) | Payload::Empty)
    }

    fn to_bytes(&self, payload: &Payload, _content_type: Option<&str>) -> Result<Vec<u8>> {
        payload
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Conversion("Payload is not raw bytes".into()))
    }
}

/// Encodes text payloads as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl PayloadConverter for TextConverter {
    fn can_convert(&self, payload: &Payload, content_type: Option<&str>) -> bool {
        matches!(payload, Payload::Text(_)) && !is_json(content_type)
    }

    fn to_bytes(&self, payload: &Payload, _content_type: Option<&str>) -> Result<Vec<u8>> {
        match payload {
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            _ => Err(Error::Conversion("Payload is not text".into())),
        }
    }
}

/// Serializes JSON payloads, and text declared as `application/json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

impl PayloadConverter for JsonConverter {
    fn can_convert(&self, payload: &Payload, content_type: Option<&str>) -> bool {
        match payload {
            Payload::Json(_) => true,
            Payload::Text(_) => is_json(content_type),
            Payload::Bytes(_) | Payload::Empty => false,
        }
    }

    fn to_bytes(&self, payload: &Payload, _content_type: Option<&str>) -> Result<Vec<u8>> {
        match payload {
            Payload::Json(value) => Ok(serde_json::to_vec(value)?),
            // Already serialized; validate so the broker never sees broken JSON.
            Payload::Text(text) => {
                serde_json::from_str::<serde_json::Value>(text)?;
                Ok(text.as_bytes().to_vec())
            }
            _ => Err(Error::Conversion("Payload is not JSON".into())),
        }
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or(ct).trim();
        essence.eq_ignore_ascii_case("application/json") || essence.ends_with("+json")
    })
}

/// Ordered set of converters tried first to last.
#[derive(Clone)]
pub struct CompositeConverter {
    converters: Vec<Arc<dyn PayloadConverter>>,
}

impl CompositeConverter {
    pub fn new(converters: Vec<Arc<dyn PayloadConverter>>) -> Self {
        Self { converters }
    }
}

impl Default for CompositeConverter {
    /// Bytes, JSON, then text.
    fn default() -> Self {
        Self::new(vec![
            Arc::new(BytesConverter),
            Arc::new(JsonConverter),
            Arc::new(TextConverter),
        ])
    }
}

impl std::fmt::Debug for CompositeConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeConverter")
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl PayloadConverter for CompositeConverter {
    fn can_convert(&self, payload: &Payload, content_type: Option<&str>) -> bool {
        self.converters
            .iter()
            .any(|c| c.can_convert(payload, content_type))
    }

    fn to_bytes(&self, payload: &Payload, content_type: Option<&str>) -> Result<Vec<u8>> {
        let converter = self
            .converters
            .iter()
            .find(|c| c.can_convert(payload, content_type))
            .ok_or_else(|| {
                Error::Conversion(format!(
                    "No converter for payload with content type {}",
                    content_type.unwrap_or("<none>")
                ))
            })?;
        converter.to_bytes(payload, content_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_composite_handles_every_payload_kind() {
        let converter = CompositeConverter::default();
        assert_eq!(
            converter.to_bytes(&Payload::Bytes(vec![1, 2]), None).unwrap(),
            vec![1, 2]
        );
        assert!(converter.to_bytes(&Payload::Empty, None).unwrap().is_empty());
        assert_eq!(
            converter
                .to_bytes(&Payload::Text("héllo".into()), Some("text/plain"))
                .unwrap(),
            "héllo".as_bytes()
        );
        assert_eq!(
            converter
                .to_bytes(&Payload::Json(json!({"a": 1})), None)
                .unwrap(),
            br#"{"a":1}"#
        );
    }

    #[test]
    fn json_content_type_validates_text() {
        let converter = CompositeConverter::default();
        let ct = Some("application/json;charset=UTF-8");
        assert!(
            converter
                .to_bytes(&Payload::Text("{\"ok\":true}".into()), ct)
                .is_ok()
        );
        assert!(matches!(
            converter.to_bytes(&Payload::Text("{not json".into()), ct),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn empty_composite_reports_conversion_error() {
        let converter = CompositeConverter::new(Vec::new());
        assert!(matches!(
            converter.to_bytes(&Payload::Text("x".into()), None),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn vendor_json_types_are_json() {
        assert!(is_json(Some("application/vnd.api+json")));
        assert!(!is_json(Some("text/plain")));
        assert!(!is_json(None));
    }
}
