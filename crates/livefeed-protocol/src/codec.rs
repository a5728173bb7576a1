//! Codec for decoding inbound envelopes and encoding outbound messages.
//!
//! Frames are JSON text. A frame that fails to decode is reported as a
//! [`DecodeError`]; callers drop it and keep the connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::{Category, Envelope, Payload};

/// Default maximum inbound frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },

    /// Frame bytes are not UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// Frame is not JSON or lacks `type`, `data` or `timestamp`.
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// `data` does not match the documented shape for its category.
    #[error("Invalid {category} payload: {source}")]
    Payload {
        /// Category named by the frame.
        category: Category,
        /// Underlying shape mismatch.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors produced while encoding an outbound message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Value could not be serialized to JSON.
    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
    timestamp: serde_json::Number,
}

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: serde_json::Value,
    timestamp: i64,
}

fn timestamp_from(number: &serde_json::Number) -> i64 {
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f as i64))
        .unwrap_or_default()
}

/// Decode an envelope from a text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a well-formed envelope or a known
/// category's payload has the wrong shape.
pub fn decode_text(text: &str) -> Result<Envelope, DecodeError> {
    let wire: WireEnvelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let timestamp = timestamp_from(&wire.timestamp);

    let payload = match wire.kind.parse::<Category>() {
        Ok(category) => typed_payload(category, wire.data)?,
        Err(_) => Payload::Other {
            kind: wire.kind,
            data: wire.data,
        },
    };

    Ok(Envelope::new(payload, timestamp))
}

fn typed_payload(category: Category, data: serde_json::Value) -> Result<Payload, DecodeError> {
    let wrap = |source| DecodeError::Payload { category, source };
    let payload = match category {
        Category::Dashboard => Payload::Dashboard(serde_json::from_value(data).map_err(wrap)?),
        Category::Order => Payload::Order(serde_json::from_value(data).map_err(wrap)?),
        Category::Risk => Payload::Risk(serde_json::from_value(data).map_err(wrap)?),
    };
    Ok(payload)
}

/// Decode an envelope from raw frame bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or not a well-formed envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, DecodeError> {
    decode_text(std::str::from_utf8(data)?)
}

/// Encode any serializable value as an outbound text frame.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(value)?)
}

/// Encode an envelope back into its wire form.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, EncodeError> {
    let wire = WireEnvelopeRef {
        kind: envelope.payload.kind(),
        data: envelope.payload.to_value()?,
        timestamp: envelope.timestamp,
    };
    encode(&wire)
}

/// Size-checking envelope codec.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame_size: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl EnvelopeCodec {
    /// Create a codec that rejects frames larger than `max_frame_size`.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Configured size limit.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or malformed.
    pub fn decode_text(&self, text: &str) -> Result<Envelope, DecodeError> {
        self.check_size(text.len())?;
        decode_text(text)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large, not UTF-8 or malformed.
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, DecodeError> {
        self.check_size(data.len())?;
        decode(data)
    }

    fn check_size(&self, size: usize) -> Result<(), DecodeError> {
        if size > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn risk_data() -> serde_json::Value {
        json!({
            "consecutiveLosses": 0,
            "maxConsecutiveLosses": 5,
            "macroCoolingMode": "inactive",
            "leverageStatus": "relaxed",
            "maxLeverage": "2.0",
            "currentLeverage": "1.0"
        })
    }

    fn dashboard_data() -> serde_json::Value {
        json!({
            "pnlDaily": "12.50",
            "pnlPercent": "0.01",
            "totalEquity": "100000.00",
            "riskExposure": "3.2",
            "dailyDrawdown": "0.00",
            "systemHealth": [
                {"name": "Spot Gateway", "status": "normal", "latency": 12}
            ],
            "riskStatus": risk_data(),
            "strategies": []
        })
    }

    #[test]
    fn test_decode_dashboard_frame() {
        let frame = json!({"type": "dashboard", "data": dashboard_data(), "timestamp": 1});
        let envelope = decode(frame.to_string().as_bytes()).unwrap();

        assert_eq!(envelope.category(), Some(Category::Dashboard));
        assert_eq!(envelope.timestamp, 1);
        match envelope.payload {
            Payload::Dashboard(snapshot) => {
                assert_eq!(snapshot.total_equity, "100000.00");
                assert_eq!(snapshot.system_health.len(), 1);
                assert_eq!(snapshot.system_health[0].latency, Some(12));
            }
            other => panic!("Expected dashboard payload, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_category_is_not_an_error() {
        let frame = r#"{"type":"funding","data":{"rate":"0.0001"},"timestamp":5}"#;
        let envelope = decode_text(frame).unwrap();

        assert_eq!(envelope.category(), None);
        assert_eq!(envelope.payload.kind(), "funding");
    }

    #[test]
    fn test_decode_fractional_timestamp_truncates() {
        let frame = json!({"type": "risk", "data": risk_data(), "timestamp": 1700000000.75});
        let envelope = decode_text(&frame.to_string()).unwrap();
        assert_eq!(envelope.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_decode_not_json() {
        match decode_text("not json at all") {
            Err(DecodeError::Malformed(_)) => {}
            other => panic!("Expected Malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_fields() {
        for frame in [
            r#"{"data":{},"timestamp":1}"#,
            r#"{"type":"risk","timestamp":1}"#,
            r#"{"type":"risk","data":{}}"#,
            r#"{"type":"risk","data":{},"timestamp":"yesterday"}"#,
            r#"[1,2,3]"#,
        ] {
            assert!(
                matches!(decode_text(frame), Err(DecodeError::Malformed(_))),
                "frame should be malformed: {frame}"
            );
        }
    }

    #[test]
    fn test_decode_wrong_payload_shape() {
        let frame = json!({"type": "order", "data": {"symbol": 42}, "timestamp": 1});
        match decode_text(&frame.to_string()) {
            Err(DecodeError::Payload { category, .. }) => assert_eq!(category, Category::Order),
            other => panic!("Expected Payload error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_invalid_utf8() {
        match decode(&[0x7b, 0xff, 0xfe, 0x7d]) {
            Err(DecodeError::NotUtf8(_)) => {}
            other => panic!("Expected NotUtf8 error, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_rejects_oversized_frame() {
        let codec = EnvelopeCodec::new(16);
        let frame = json!({"type": "risk", "data": risk_data(), "timestamp": 1}).to_string();

        match codec.decode_text(&frame) {
            Err(DecodeError::FrameTooLarge { size, max }) => {
                assert_eq!(size, frame.len());
                assert_eq!(max, 16);
            }
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_envelope_keeps_wire_shape() {
        let frame = json!({"type": "risk", "data": risk_data(), "timestamp": 9});
        let envelope = decode_text(&frame.to_string()).unwrap();

        let encoded: serde_json::Value =
            serde_json::from_str(&encode_envelope(&envelope).unwrap()).unwrap();
        assert_eq!(encoded["type"], "risk");
        assert_eq!(encoded["timestamp"], 9);
        assert_eq!(encoded["data"]["maxLeverage"], "2.0");
    }

    #[test]
    fn test_encode_outbound_value() {
        let text = encode(&json!({"action": "refresh"})).unwrap();
        assert_eq!(text, r#"{"action":"refresh"}"#);
    }
}
