//! Binance Stream Message Types
//!
//! Frames arriving on a market-data WebSocket. A raw stream
//! (`/ws/<stream>`) delivers event objects directly; a combined stream
//! (`/stream?streams=...`) wraps each one as `{"stream": ..., "data": ...}`.
//!
//! # Aggregated Trade (JSON)
//! ```json
//! {"e":"aggTrade","E":1672515782136,"s":"BNBBTC","a":12345,"p":"0.001",
//!  "q":"100","f":100,"l":105,"T":1672515782136,"m":true,"M":true}
//! ```
//!
//! # Control Response (JSON)
//! ```json
//! {"result":null,"id":1}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::trade::AggTradeEvent;

/// Decoded WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Aggregated trade event.
    AggTrade(AggTradeEvent),
    /// Event of another type (e.g. `trade`, `kline`).
    Other {
        /// Event type.
        event_type: String,
    },
    /// Response to a control request.
    Response {
        /// Request identifier.
        id: Option<u64>,
    },
    /// Error reported by the server.
    Error(ApiErrorBody),
}

/// Envelope used by combined streams.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CombinedEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

/// Error body returned by the WebSocket and REST APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Binance error code.
    pub code: i64,
    /// Error message.
    pub msg: String,
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.msg, self.code)
    }
}
