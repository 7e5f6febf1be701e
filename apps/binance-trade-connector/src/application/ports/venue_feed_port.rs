//! Venue Feed Port (Driven Port)
//!
//! Interface for attaching to an exchange's per-pair aggregated-trade feed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::trade::{AggTradeEvent, TradingPair};

/// Venue feed error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Established connection was lost and could not be recovered.
    #[error("feed transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Connection could not be established.
    #[error("feed connection failed: {0}")]
    Connect(String),

    /// Exchange API answered with a non-success status.
    #[error("exchange API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Receiver of events from one opened feed.
///
/// Handlers are invoked from the feed's own task. `on_event` may suspend
/// (for example while the consumer applies backpressure); the feed does not
/// read further frames until it returns.
#[async_trait]
pub trait FeedHandler: Send + Sync {
    /// Deliver one aggregated trade event.
    async fn on_event(&self, event: AggTradeEvent);

    /// Report a transport failure the feed could not recover from.
    ///
    /// Called at most once, after which the feed stops.
    fn on_error(&self, error: FeedError);
}

/// Port for opening per-pair trade feeds.
#[async_trait]
pub trait VenueFeed: Send + Sync {
    /// Open the aggregated-trade feed for a pair.
    ///
    /// Returns once the feed is attached; events flow to `handler` until
    /// the returned handle is stopped.
    async fn open_feed(
        &self,
        pair: &TradingPair,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError>;
}

// =============================================================================
// Feed Handle
// =============================================================================

/// Ownership of one opened feed.
///
/// Stopping (or dropping) the handle cancels the feed's task.
#[derive(Debug)]
pub struct FeedHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Create a handle for a feed driven by `task` and stopped via `cancel`.
    #[must_use]
    pub const fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Create a handle with no backing task.
    #[must_use]
    pub const fn detached(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    /// Request the feed to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the feed and wait for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::warn!(error = %e, "Feed task panicked");
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
