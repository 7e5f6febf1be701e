//! Binance Adapters
//!
//! - **Stream**: per-pair aggregated-trade WebSocket feed (`VenueFeed`)
//! - **REST**: exchange info lookup (`ExchangeInfoPort`)

pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod rest;
pub mod stream;

pub use codec::{CodecError, JsonCodec};
pub use heartbeat::HeartbeatConfig;
pub use messages::{ApiErrorBody, StreamFrame};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest::{BinanceRestClient, BinanceRestConfig};
pub use stream::{BinanceAggTradeFeed, BinanceStreamConfig};
