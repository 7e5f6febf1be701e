//! Trade Types
//!
//! Canonical trade record, trading pair identity, and the venue-native
//! aggregated trade event they are built from.
//!
//! # Side Encoding
//!
//! A trade record carries no explicit side. The sign of `volume` encodes it:
//! when the buyer was *not* the maker the taker sold into the bid and the
//! volume is negative; when the buyer was the maker the volume is positive.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type value carried by every aggregated trade event.
pub const AGG_TRADE_EVENT: &str = "aggTrade";

// =============================================================================
// Trading Pair
// =============================================================================

/// A base/quote market on a venue.
///
/// Two pairs are equal when their canonical symbol and exchange match; the
/// exchange-native name is informational and does not take part in
/// equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPair {
    /// Canonical base asset symbol (e.g. `BTC`).
    pub symbol: String,
    /// Exchange-native pair name (e.g. `BTCUSDT`).
    pub foreign_name: String,
    /// Exchange the pair trades on.
    pub exchange: String,
}

impl TradingPair {
    /// Create a new trading pair.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        foreign_name: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            foreign_name: foreign_name.into(),
            exchange: exchange.into(),
        }
    }
}

impl PartialEq for TradingPair {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.exchange == other.exchange
    }
}

impl Eq for TradingPair {}

impl Hash for TradingPair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.exchange.hash(state);
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.exchange, self.foreign_name, self.symbol)
    }
}

// =============================================================================
// Venue Event
// =============================================================================

/// Aggregated trade event as delivered by the venue feed.
///
/// # Wire Format (JSON)
/// ```json
/// {"e":"aggTrade","E":1672515782136,"s":"BTCUSDT","a":12345,"p":"20000.00",
///  "q":"1.5","f":100,"l":105,"T":1672515782136,"m":true,"M":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTradeEvent {
    /// Event type (`aggTrade`).
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time in epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Exchange-native pair name.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Aggregate trade identifier.
    #[serde(rename = "a")]
    pub agg_trade_id: u64,

    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,

    /// Quantity as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,

    /// First trade identifier folded into this aggregate.
    #[serde(rename = "f", default)]
    pub first_trade_id: u64,

    /// Last trade identifier folded into this aggregate.
    #[serde(rename = "l", default)]
    pub last_trade_id: u64,

    /// Trade time in epoch milliseconds.
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Whether the buyer was the market maker.
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Reasons a venue event cannot become a trade record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeParseError {
    /// Event is not an aggregated trade.
    #[error("not a trade event: {0}")]
    NotATrade(String),

    /// A numeric field failed to parse.
    #[error("invalid {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// Trade time is outside the representable range.
    #[error("invalid trade time: {0}")]
    InvalidTimestamp(i64),
}

// =============================================================================
// Trade Record
// =============================================================================

/// Normalized trade delivered on the connector's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Canonical base asset symbol.
    pub symbol: String,
    /// Exchange-native pair name.
    pub pair: String,
    /// Trade price in quote currency units.
    pub price: f64,
    /// Signed volume; negative when the buyer was not the maker.
    pub volume: f64,
    /// Trade time.
    pub time: DateTime<Utc>,
    /// Venue trade identifier (aggregate id in lowercase hex).
    pub foreign_trade_id: String,
    /// Exchange the trade came from.
    pub source: String,
}

impl TradeRecord {
    /// Build a trade record from an aggregated trade event.
    ///
    /// # Errors
    ///
    /// Returns `TradeParseError` if the event is not an aggregated trade or
    /// its price, quantity or trade time cannot be interpreted.
    pub fn from_agg_trade(
        pair: &TradingPair,
        event: &AggTradeEvent,
        source: &str,
    ) -> Result<Self, TradeParseError> {
        if event.event_type != AGG_TRADE_EVENT {
            return Err(TradeParseError::NotATrade(event.event_type.clone()));
        }

        let quantity = parse_decimal("quantity", &event.quantity)?;
        let price = parse_decimal("price", &event.price)?;

        let volume = if event.is_buyer_maker {
            quantity
        } else {
            -quantity
        };

        let time = DateTime::from_timestamp_millis(event.trade_time)
            .ok_or(TradeParseError::InvalidTimestamp(event.trade_time))?;

        Ok(Self {
            symbol: pair.symbol.clone(),
            pair: pair.foreign_name.clone(),
            price,
            volume,
            time,
            foreign_trade_id: format!("{:x}", event.agg_trade_id),
            source: source.to_string(),
        })
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<f64, TradeParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TradeParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================
