//! Domain Layer - Trade types, symbol normalization and subscription bookkeeping.
//!
//! Nothing in this layer performs I/O. Exchange access goes through the
//! ports defined in the application layer.

/// Trade records, trading pairs and the venue aggregated-trade event.
pub mod trade;

/// Canonical symbol normalization.
pub mod symbol;

/// Pair subscription registry.
pub mod subscription;
