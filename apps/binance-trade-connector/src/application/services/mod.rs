//! Application Services
//!
//! - `Connector`: lifecycle state machine, pair subscriptions and the
//!   shared trade output stream
//! - `AvailablePairsFetcher`: one-shot lookup of tradable pairs

mod connector;
mod pairs;

pub use connector::{
    Connector, ConnectorError, ConnectorOptions, ConnectorState, ConnectorStats, PairSubscription,
    TradeStream,
};
pub use pairs::AvailablePairsFetcher;
