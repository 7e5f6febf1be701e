//! Stream Codec
//!
//! JSON decoding of Binance market-data WebSocket text frames.

use super::messages::{ApiErrorBody, CombinedEnvelope, StreamFrame};
use crate::domain::trade::{AGG_TRADE_EVENT, AggTradeEvent};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not a recognized shape.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for market-data streams.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// Combined-stream envelopes are unwrapped before the payload is
    /// inspected.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or has an unknown shape.
    pub fn decode(&self, text: &str) -> Result<StreamFrame, CodecError> {
        let mut value: serde_json::Value = serde_json::from_str(text.trim())?;

        if value.get("stream").is_some() && value.get("data").is_some() {
            let envelope: CombinedEnvelope = serde_json::from_value(value)?;
            tracing::trace!(stream = %envelope.stream, "Unwrapped combined stream frame");
            value = envelope.data;
        }

        if let Some(event_type) = value.get("e").and_then(|v| v.as_str()) {
            if event_type == AGG_TRADE_EVENT {
                let event: AggTradeEvent = serde_json::from_value(value)?;
                return Ok(StreamFrame::AggTrade(event));
            }
            return Ok(StreamFrame::Other {
                event_type: event_type.to_string(),
            });
        }

        if value.get("code").is_some() && value.get("msg").is_some() {
            let body: ApiErrorBody = serde_json::from_value(value)?;
            return Ok(StreamFrame::Error(body));
        }

        if value.get("result").is_some() {
            return Ok(StreamFrame::Response {
                id: value.get("id").and_then(serde_json::Value::as_u64),
            });
        }

        let preview: String = text.chars().take(50).collect();
        Err(CodecError::InvalidFormat(format!(
            "expected event, response or error object, got: {preview}..."
        )))
    }
}
