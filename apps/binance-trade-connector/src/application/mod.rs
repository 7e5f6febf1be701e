//! Application Layer - Connector lifecycle and port definitions.
//!
//! This layer owns the connector state machine and the interfaces it
//! uses to reach the exchange.

/// Port interfaces for the venue feed and exchange metadata.
pub mod ports;

/// Connector lifecycle and available-pairs lookup.
pub mod services;
