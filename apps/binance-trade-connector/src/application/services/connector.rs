//! Connector Lifecycle
//!
//! Owns the connector state machine, the per-pair feed registry and the
//! single output stream all subscribed pairs deliver onto.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──► Ready ──► Running ──► Closing ──► Closed
//!                            │
//!             close() ───────┤
//!     feed transport error ──┘
//! ```
//!
//! A background control task is spawned at construction. It publishes
//! `Ready` and `Running`, then waits for a close request or an escalated
//! feed failure. Teardown marks every subscription closed, stops every
//! venue feed, records the terminal outcome and publishes `Closed`.
//!
//! # Delivery
//!
//! Each live pair feed gets a [`TradeHandler`] that converts venue events
//! into [`TradeRecord`]s and pushes them onto a bounded channel. The push
//! races the shutdown signal and the reading side stops yielding once
//! shutdown is requested, so no trade is observed after close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::Stream;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::pairs::AvailablePairsFetcher;
use crate::application::ports::{ExchangeInfoPort, FeedError, FeedHandle, FeedHandler, VenueFeed};
use crate::domain::subscription::{PairRegistry, RegistryStats, SubscriptionId, SubscriptionState};
use crate::domain::symbol::SymbolTable;
use crate::domain::trade::{AggTradeEvent, TradeParseError, TradeRecord, TradingPair};
use crate::infrastructure::metrics::{self, DiscardReason};

// =============================================================================
// State & Errors
// =============================================================================

/// Lifecycle state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    /// Control task not yet running.
    Starting,
    /// Ready to accept subscriptions.
    Ready,
    /// Accepting subscriptions and delivering trades.
    Running,
    /// Teardown in progress.
    Closing,
    /// Fully shut down.
    Closed,
}

impl ConnectorState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether teardown has started or finished.
    #[must_use]
    pub fn is_shutting_down(self) -> bool {
        self >= Self::Closing
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The connector or subscription has already been closed.
    #[error("already closed")]
    AlreadyClosed,

    /// Venue feed or exchange API call failed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// A live feed lost its transport; the connector shut down.
    #[error("transport failure on {pair}: {message}")]
    Transport {
        /// Exchange-native pair name.
        pair: String,
        /// Error details.
        message: String,
    },
}

/// Connector construction options.
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Exchange name stamped on every trade record.
    pub exchange_name: String,
    /// Output stream capacity (minimum 1).
    pub output_capacity: usize,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            exchange_name: "Binance".to_string(),
            output_capacity: 1,
        }
    }
}

/// Point-in-time connector statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorStats {
    /// Exchange name.
    pub exchange: String,
    /// Lifecycle state.
    pub state: ConnectorState,
    /// Pairs with a live feed.
    pub pair_count: usize,
    /// Attached subscriptions.
    pub subscription_count: usize,
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug, Default)]
struct Terminal {
    error: Option<ConnectorError>,
    closed: bool,
}

struct Inner {
    exchange: String,
    feed: Arc<dyn VenueFeed>,
    registry: PairRegistry<FeedHandle>,
    state: watch::Sender<ConnectorState>,
    shutdown: CancellationToken,
    close_requested: AtomicBool,
    terminal: RwLock<Terminal>,
    output: mpsc::Sender<TradeRecord>,
    failures: mpsc::UnboundedSender<ConnectorError>,
}

impl Inner {
    fn terminal_error(&self) -> Option<ConnectorError> {
        self.terminal.read().error.clone()
    }

    fn publish_registry_sizes(&self) {
        let stats = self.registry.stats();
        metrics::set_registry_sizes(stats.pair_count, stats.subscription_count);
    }

    fn detach(&self, pair: &TradingPair, id: SubscriptionId) {
        if let Some(released) = self.registry.leave(pair, id) {
            released.feed.stop();
            tracing::info!(pair = %released.pair, "Last subscriber left, venue feed stopped");
        }
        self.publish_registry_sizes();
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Exchange trade connector.
///
/// Construct with [`Connector::new`] inside a Tokio runtime. Dropping the
/// connector without closing it requests shutdown.
pub struct Connector {
    inner: Arc<Inner>,
    output: TradeStream,
    pairs: AvailablePairsFetcher,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("exchange", &self.inner.exchange)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Create a connector and start its control task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        options: ConnectorOptions,
        feed: Arc<dyn VenueFeed>,
        exchange_info: Arc<dyn ExchangeInfoPort>,
        symbols: Arc<dyn SymbolTable>,
    ) -> Self {
        let (output_tx, output_rx) = mpsc::channel(options.output_capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectorState::Starting);
        let shutdown = CancellationToken::new();

        let inner = Arc::new(Inner {
            exchange: options.exchange_name.clone(),
            feed,
            registry: PairRegistry::new(),
            state: state_tx,
            shutdown: shutdown.clone(),
            close_requested: AtomicBool::new(false),
            terminal: RwLock::new(Terminal::default()),
            output: output_tx,
            failures: failures_tx,
        });

        tokio::spawn(run_control(Arc::clone(&inner), failures_rx));

        Self {
            inner,
            output: TradeStream::new(output_rx, shutdown),
            pairs: AvailablePairsFetcher::new(options.exchange_name, exchange_info, symbols),
        }
    }

    /// Subscribe to trades for one pair.
    ///
    /// Waits until the connector is ready. The first subscriber for a pair
    /// opens its venue feed; later subscribers share it.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` if the connector is closing or closed, or
    /// `Feed` if the venue feed could not be opened.
    pub async fn subscribe(&self, pair: TradingPair) -> Result<PairSubscription, ConnectorError> {
        self.wait_ready().await?;

        let registry = &self.inner.registry;
        let state = Arc::new(SubscriptionState::new(registry.next_id(), pair.clone()));

        if !registry.join(&state) {
            let opened = {
                let lock = registry.pair_lock(&pair);
                let _guard = lock.lock().await;

                if registry.join(&state) {
                    Ok(())
                } else {
                    self.open_feed(&state).await
                }
            };

            if let Err(e) = opened {
                registry.prune_lock(&pair);
                return Err(e);
            }
        }

        if self.inner.shutdown.is_cancelled() {
            state.mark_closed();
            self.inner.detach(&pair, state.id());
            return Err(ConnectorError::AlreadyClosed);
        }

        self.inner.publish_registry_sizes();
        tracing::debug!(pair = %pair, subscription_id = state.id(), "Pair subscribed");

        Ok(PairSubscription {
            state,
            connector: Arc::downgrade(&self.inner),
        })
    }

    async fn open_feed(&self, state: &Arc<SubscriptionState>) -> Result<(), ConnectorError> {
        let pair = state.pair();
        let live = Arc::new(AtomicBool::new(true));
        let handler = Arc::new(TradeHandler {
            pair: pair.clone(),
            exchange: self.inner.exchange.clone(),
            live: Arc::clone(&live),
            shutdown: self.inner.shutdown.clone(),
            output: self.inner.output.clone(),
            failures: self.inner.failures.clone(),
        });

        let handle = match self.inner.feed.open_feed(pair, handler).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Failed to open venue feed");
                return Err(e.into());
            }
        };

        if let Some(duplicate) = self.inner.registry.install(Arc::clone(state), handle, live) {
            duplicate.stop();
        }

        tracing::info!(pair = %pair, "Venue feed opened");
        Ok(())
    }

    async fn wait_ready(&self) -> Result<(), ConnectorError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| *s >= ConnectorState::Ready)
            .await
            .map(|s| *s)
            .map_err(|_| ConnectorError::AlreadyClosed)?;

        if state.is_shutting_down() || self.inner.shutdown.is_cancelled() {
            return Err(ConnectorError::AlreadyClosed);
        }
        Ok(())
    }

    /// Close the connector.
    ///
    /// Waits for teardown to finish. Only the first caller proceeds.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` if the connector was already closed or
    /// another close is in progress, or the terminal error recorded during
    /// shutdown.
    pub async fn close(&self) -> Result<(), ConnectorError> {
        if self.inner.close_requested.swap(true, Ordering::AcqRel)
            || self.inner.terminal.read().closed
        {
            return Err(ConnectorError::AlreadyClosed);
        }

        tracing::info!(exchange = %self.inner.exchange, "Closing connector");
        self.inner.shutdown.cancel();
        self.wait_closed().await;

        self.inner.terminal_error().map_or(Ok(()), Err)
    }

    /// Wait until the connector has fully shut down.
    pub async fn wait_closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectorState::Closed).await;
    }

    /// Shared output stream of trade records.
    #[must_use]
    pub fn output_stream(&self) -> TradeStream {
        self.output.clone()
    }

    /// Fetch the exchange's currently tradable pairs.
    ///
    /// # Errors
    ///
    /// Returns `Feed` if the exchange info request fails.
    pub async fn fetch_available_pairs(&self) -> Result<Vec<TradingPair>, ConnectorError> {
        self.pairs.fetch_available_pairs().await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectorState> {
        self.inner.state.subscribe()
    }

    /// Terminal error, if the connector shut down because of one.
    #[must_use]
    pub fn error(&self) -> Option<ConnectorError> {
        self.inner.terminal_error()
    }

    /// Whether shutdown has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.terminal.read().closed
    }

    /// Exchange name.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.inner.exchange
    }

    /// Number of attached subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.subscription_count()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ConnectorStats {
        let RegistryStats {
            pair_count,
            subscription_count,
        } = self.inner.registry.stats();
        ConnectorStats {
            exchange: self.inner.exchange.clone(),
            state: self.state(),
            pair_count,
            subscription_count,
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

// =============================================================================
// Control Task
// =============================================================================

async fn run_control(inner: Arc<Inner>, mut failures: mpsc::UnboundedReceiver<ConnectorError>) {
    inner.state.send_replace(ConnectorState::Ready);
    inner.state.send_replace(ConnectorState::Running);
    tracing::info!(exchange = %inner.exchange, "Connector running");

    let failure = tokio::select! {
        () = inner.shutdown.cancelled() => None,
        Some(error) = failures.recv() => Some(error),
    };

    if let Some(error) = &failure {
        tracing::error!(
            exchange = %inner.exchange,
            error = %error,
            "Shutting down after feed failure"
        );
    }

    inner.shutdown.cancel();
    inner.state.send_replace(ConnectorState::Closing);

    let released = inner.registry.drain();
    let feed_count = released.len();
    futures_util::future::join_all(released.into_iter().map(|r| r.feed.shutdown())).await;
    inner.publish_registry_sizes();

    {
        let mut terminal = inner.terminal.write();
        if terminal.error.is_none() {
            terminal.error = failure;
        }
        terminal.closed = true;
    }

    inner.state.send_replace(ConnectorState::Closed);
    tracing::info!(exchange = %inner.exchange, feeds_stopped = feed_count, "Connector closed");
}

// =============================================================================
// Trade Handler
// =============================================================================

/// Feed handler converting venue events into trade records.
struct TradeHandler {
    pair: TradingPair,
    exchange: String,
    live: Arc<AtomicBool>,
    shutdown: CancellationToken,
    output: mpsc::Sender<TradeRecord>,
    failures: mpsc::UnboundedSender<ConnectorError>,
}

impl TradeHandler {
    fn accepting(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl FeedHandler for TradeHandler {
    async fn on_event(&self, event: AggTradeEvent) {
        if !self.accepting() {
            return;
        }

        let trade = match TradeRecord::from_agg_trade(&self.pair, &event, &self.exchange) {
            Ok(trade) => trade,
            Err(e) => {
                tracing::warn!(pair = %self.pair, error = %e, "Discarding venue event");
                metrics::record_event_discarded(match e {
                    TradeParseError::NotATrade(_) => DiscardReason::NotATrade,
                    TradeParseError::InvalidNumber { .. }
                    | TradeParseError::InvalidTimestamp(_) => DiscardReason::InvalidField,
                });
                return;
            }
        };

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {}
            sent = self.output.send(trade) => {
                if sent.is_ok() {
                    metrics::record_trade_delivered(&self.exchange);
                }
            }
        }
    }

    fn on_error(&self, error: FeedError) {
        if !self.accepting() {
            tracing::debug!(pair = %self.pair, error = %error, "Ignoring error from detached feed");
            return;
        }

        tracing::error!(pair = %self.pair, error = %error, "Venue feed failed");
        metrics::record_transport_error(&self.pair.foreign_name);

        let _ = self.failures.send(ConnectorError::Transport {
            pair: self.pair.foreign_name.clone(),
            message: error.to_string(),
        });
    }
}

// =============================================================================
// Output Stream
// =============================================================================

/// Shared stream of trade records.
///
/// Clones read from the same channel; each trade is delivered to exactly
/// one reader. Reading ends once connector shutdown is requested.
#[derive(Clone)]
pub struct TradeStream {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TradeRecord>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for TradeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeStream")
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

impl TradeStream {
    fn new(rx: mpsc::Receiver<TradeRecord>, shutdown: CancellationToken) -> Self {
        Self {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            shutdown,
        }
    }

    /// Receive the next trade.
    ///
    /// Returns `None` once the connector is shutting down.
    pub async fn recv(&self) -> Option<TradeRecord> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let mut rx = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return None,
            guard = self.rx.lock() => guard,
        };

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => None,
            trade = rx.recv() => trade,
        }
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Adapt into a `futures` stream.
    pub fn into_stream(self) -> impl Stream<Item = TradeRecord> + Send {
        futures_util::stream::unfold(self, |stream| async move {
            stream.recv().await.map(|trade| (trade, stream))
        })
    }
}

// =============================================================================
// Pair Subscription
// =============================================================================

/// One caller's interest in one trading pair.
///
/// Holds a non-owning reference to its connector; it does not keep the
/// connector alive.
#[derive(Debug)]
pub struct PairSubscription {
    state: Arc<SubscriptionState>,
    connector: Weak<Inner>,
}

impl PairSubscription {
    /// Close this subscription.
    ///
    /// The last subscription closed for a pair stops the pair's venue feed.
    ///
    /// # Errors
    ///
    /// Returns the connector's terminal error if one was recorded, or
    /// `AlreadyClosed` if this subscription was already closed.
    pub fn close(&self) -> Result<(), ConnectorError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if !self.state.mark_closed() {
            return Err(ConnectorError::AlreadyClosed);
        }

        if let Some(inner) = self.connector.upgrade() {
            inner.detach(self.state.pair(), self.state.id());
        }
        tracing::debug!(
            pair = %self.state.pair(),
            subscription_id = self.state.id(),
            "Pair unsubscribed"
        );
        Ok(())
    }

    /// The connector's terminal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<ConnectorError> {
        self.connector
            .upgrade()
            .and_then(|inner| inner.terminal_error())
    }

    /// Pair this subscription is attached to.
    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        self.state.pair()
    }

    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.state.id()
    }

    /// Whether the subscription has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

// =============================================================================
// Tests
// =============================================================================
