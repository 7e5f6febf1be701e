//! Port Interfaces
//!
//! Contracts the connector uses to reach the exchange. Infrastructure
//! adapters implement them; tests substitute in-memory fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - `VenueFeed`: opens one aggregated-trade feed per pair
//! - `ExchangeInfoPort`: fetches the exchange symbol list
//!
//! The canonical symbol table port lives with the normalizer in
//! [`crate::domain::symbol::SymbolTable`].

mod exchange_info_port;
mod venue_feed_port;

pub use exchange_info_port::{ExchangeInfo, ExchangeInfoPort, SymbolInfo};
pub use venue_feed_port::{FeedError, FeedHandle, FeedHandler, VenueFeed};
