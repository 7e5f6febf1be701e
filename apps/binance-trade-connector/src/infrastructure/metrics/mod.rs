//! Prometheus Metrics Module
//!
//! Exposes connector metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Trades**: Trades delivered on the output stream, events discarded
//! - **Feeds**: Live pair feeds, transport errors, reconnect attempts
//! - **Subscriptions**: Attached pair subscriptions
//! - **Pairs**: Exchange symbols skipped during the available-pairs lookup
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "trade_connector_trades_delivered_total",
        "Total trades pushed onto the output stream"
    );
    describe_counter!(
        "trade_connector_events_discarded_total",
        "Total venue events discarded before normalization"
    );
    describe_counter!(
        "trade_connector_pairs_skipped_total",
        "Total exchange symbols skipped during available-pairs lookup"
    );

    describe_gauge!(
        "trade_connector_active_feeds",
        "Number of live per-pair venue feeds"
    );
    describe_gauge!(
        "trade_connector_active_subscriptions",
        "Number of attached pair subscriptions"
    );

    describe_counter!(
        "trade_connector_transport_errors_total",
        "Total unrecoverable feed transport errors"
    );
    describe_counter!(
        "trade_connector_reconnects_total",
        "Total venue feed reconnection attempts"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reason a venue event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Frame could not be decoded.
    Malformed,
    /// Event type was not an aggregated trade.
    NotATrade,
    /// Price, quantity or time failed to parse.
    InvalidField,
}

impl DiscardReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::NotATrade => "not_a_trade",
            Self::InvalidField => "invalid_field",
        }
    }
}

/// Record a trade pushed onto the output stream.
pub fn record_trade_delivered(exchange: &str) {
    counter!(
        "trade_connector_trades_delivered_total",
        "exchange" => exchange.to_string()
    )
    .increment(1);
}

/// Record a discarded venue event.
pub fn record_event_discarded(reason: DiscardReason) {
    counter!(
        "trade_connector_events_discarded_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an exchange symbol skipped by the normalizer.
pub fn record_pair_skipped(reason: &'static str) {
    counter!(
        "trade_connector_pairs_skipped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the live feed and attached subscription gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_registry_sizes(feeds: usize, subscriptions: usize) {
    gauge!("trade_connector_active_feeds").set(feeds as f64);
    gauge!("trade_connector_active_subscriptions").set(subscriptions as f64);
}

/// Record an unrecoverable feed transport error.
pub fn record_transport_error(pair: &str) {
    counter!(
        "trade_connector_transport_errors_total",
        "pair" => pair.to_string()
    )
    .increment(1);
}

/// Record a venue feed reconnection attempt.
pub fn record_reconnect(pair: &str) {
    counter!(
        "trade_connector_reconnects_total",
        "pair" => pair.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
