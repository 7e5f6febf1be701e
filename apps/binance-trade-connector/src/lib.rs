#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Binance Trade Connector - Trade Ingestion Multiplexer
//!
//! Attaches to Binance's per-pair aggregated trade streams, normalizes each
//! trade into a canonical record and delivers every subscribed pair on one
//! shared output stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `trade`: Trade records, trading pairs, venue trade events
//!   - `symbol`: Canonical symbol normalization
//!   - `subscription`: Per-pair subscription registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Venue feed and exchange info interfaces
//!   - `services`: Connector lifecycle, available-pairs lookup
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket aggTrade feed and REST client
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! btcusdt@aggTrade ──► TradeHandler ──┐
//! ethbtc@aggTrade  ──► TradeHandler ──┼──► TradeStream ──► consumers
//! bnbusdt@aggTrade ──► TradeHandler ──┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trade types and rules with no I/O.
pub mod domain;

/// Application layer - Connector lifecycle and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::subscription::{PairRegistry, RegistryStats, SubscriptionId};
pub use domain::symbol::{NormalizeError, StaticSymbolTable, SymbolTable, normalize};
pub use domain::trade::{AggTradeEvent, TradeParseError, TradeRecord, TradingPair};

// Ports
pub use application::ports::{
    ExchangeInfo, ExchangeInfoPort, FeedError, FeedHandle, FeedHandler, SymbolInfo, VenueFeed,
};

// Connector
pub use application::services::{
    AvailablePairsFetcher, Connector, ConnectorError, ConnectorOptions, ConnectorState,
    ConnectorStats, PairSubscription, TradeStream,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ConnectorConfig, PairSelection};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
