//! Aggregated Trade WebSocket Feed
//!
//! Opens one Binance raw stream per trading pair and hands decoded
//! aggregated trade events to the connector's feed handler.
//!
//! # Stream URL
//!
//! - Production: `wss://stream.binance.com:9443/ws/<pair>@aggTrade`
//!
//! The pair is the exchange-native name in lowercase (`btcusdt`).
//!
//! # Protocol
//!
//! Each text frame is one JSON event. The server pings periodically and
//! drops connections that do not answer with a pong. The client pings too,
//! and treats a connection that stays silent past the heartbeat limit as
//! lost.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::heartbeat::{HeartbeatConfig, Liveness};
use super::messages::StreamFrame;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{FeedError, FeedHandle, FeedHandler, VenueFeed};
use crate::domain::trade::TradingPair;
use crate::infrastructure::metrics::{self, DiscardReason};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a live connection ended.
#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("no frames received for {0:?}")]
    Stale(std::time::Duration),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the aggregated trade feed.
#[derive(Debug, Clone)]
pub struct BinanceStreamConfig {
    /// Raw stream base URL (without trailing stream name).
    pub ws_base_url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Stale-connection detection.
    pub heartbeat: HeartbeatConfig,
}

impl Default for BinanceStreamConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "wss://stream.binance.com:9443/ws".to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl BinanceStreamConfig {
    /// Stream URL for a pair.
    #[must_use]
    pub fn stream_url(&self, pair: &TradingPair) -> String {
        format!(
            "{}/{}@aggTrade",
            self.ws_base_url.trim_end_matches('/'),
            pair.foreign_name.to_lowercase()
        )
    }
}

// =============================================================================
// Venue Feed Adapter
// =============================================================================

/// `VenueFeed` backed by Binance aggregated trade streams.
#[derive(Debug, Clone, Default)]
pub struct BinanceAggTradeFeed {
    config: BinanceStreamConfig,
    codec: JsonCodec,
}

impl BinanceAggTradeFeed {
    /// Create a new feed adapter.
    #[must_use]
    pub const fn new(config: BinanceStreamConfig) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
        }
    }
}

#[async_trait]
impl VenueFeed for BinanceAggTradeFeed {
    async fn open_feed(
        &self,
        pair: &TradingPair,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError> {
        let url = self.config.stream_url(pair);
        tracing::info!(pair = %pair.foreign_name, url = %url, "Opening aggTrade stream");

        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let cancel = CancellationToken::new();
        let task = FeedTask {
            pair: pair.foreign_name.clone(),
            url,
            codec: self.codec.clone(),
            reconnect: self.config.reconnect.clone(),
            heartbeat: self.config.heartbeat,
            handler,
            cancel: cancel.clone(),
        };

        Ok(FeedHandle::new(cancel, tokio::spawn(task.run(ws))))
    }
}

// =============================================================================
// Feed Task
// =============================================================================

struct FeedTask {
    pair: String,
    url: String,
    codec: JsonCodec,
    reconnect: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    handler: Arc<dyn FeedHandler>,
    cancel: CancellationToken,
}

impl FeedTask {
    /// Pump the connection, reconnecting until cancelled or out of attempts.
    async fn run(self, initial: WsStream) {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());
        let mut connection = Some(initial);

        loop {
            if let Some(ws) = connection.take() {
                match self.pump(ws).await {
                    Ok(()) => {
                        tracing::info!(pair = %self.pair, "aggTrade stream stopped");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(
                            pair = %self.pair,
                            error = %e,
                            "aggTrade stream connection lost"
                        );
                    }
                }
            }

            let Some(delay) = policy.next_delay() else {
                let message = format!(
                    "{} stream unrecoverable after {} reconnection attempts",
                    self.pair,
                    policy.attempt_count()
                );
                self.handler.on_error(FeedError::Transport { message });
                return;
            };

            let attempt = policy.attempt_count();
            tracing::info!(
                pair = %self.pair,
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to aggTrade stream"
            );
            metrics::record_reconnect(&self.pair);

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            let connected = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = tokio_tungstenite::connect_async(&self.url) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    tracing::info!(pair = %self.pair, attempt, "aggTrade stream reconnected");
                    policy.reset();
                    connection = Some(ws);
                }
                Err(e) => {
                    tracing::warn!(pair = %self.pair, attempt, error = %e, "Reconnection failed");
                }
            }
        }
    }

    /// Read frames until cancellation (`Ok`) or connection loss (`Err`).
    async fn pump(&self, ws: WsStream) -> Result<(), StreamError> {
        let (mut write, mut read) = ws.split();
        let mut liveness = Liveness::new(&self.heartbeat);
        let mut ping = tokio::time::interval_at(
            Instant::now() + self.heartbeat.ping_interval,
            self.heartbeat.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = tokio::time::sleep_until(liveness.deadline()) => {
                    return Err(StreamError::Stale(self.heartbeat.idle_limit()));
                }
                _ = ping.tick() => {
                    write.send(Message::Ping(Vec::new().into())).await?;
                }
                msg = read.next() => {
                    liveness.touch();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            tokio::select! {
                                () = self.cancel.cancelled() => return Ok(()),
                                () = self.handle_text(&text) => {}
                            }
                            // Time blocked on a slow consumer is not silence
                            liveness.touch();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(
                                pair = %self.pair,
                                frame = ?frame,
                                "Server sent close frame"
                            );
                            return Err(StreamError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(StreamError::ConnectionClosed),
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(StreamFrame::AggTrade(event)) => self.handler.on_event(event).await,
            Ok(StreamFrame::Other { event_type }) => {
                tracing::debug!(
                    pair = %self.pair,
                    event_type = %event_type,
                    "Ignoring non-trade event"
                );
                metrics::record_event_discarded(DiscardReason::NotATrade);
            }
            Ok(StreamFrame::Response { id }) => {
                tracing::debug!(pair = %self.pair, id = ?id, "Control response");
            }
            Ok(StreamFrame::Error(body)) => {
                tracing::warn!(
                    pair = %self.pair,
                    code = body.code,
                    msg = %body.msg,
                    "Stream error message"
                );
            }
            Err(e) => {
                tracing::warn!(pair = %self.pair, error = %e, "Discarding malformed frame");
                metrics::record_event_discarded(DiscardReason::Malformed);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::trade::AggTradeEvent;

    const AGG_TRADE: &str = r#"{
        "e": "aggTrade", "E": 1672515782136, "s": "BTCUSDT", "a": 12345,
        "p": "20000.00", "q": "1.5", "f": 100, "l": 105,
        "T": 1672515782136, "m": false, "M": true
    }"#;

    struct ChannelHandler {
        events: mpsc::UnboundedSender<AggTradeEvent>,
        errors: mpsc::UnboundedSender<FeedError>,
    }

    #[async_trait]
    impl FeedHandler for ChannelHandler {
        async fn on_event(&self, event: AggTradeEvent) {
            let _ = self.events.send(event);
        }

        fn on_error(&self, error: FeedError) {
            let _ = self.errors.send(error);
        }
    }

    fn channel_handler() -> (
        Arc<ChannelHandler>,
        mpsc::UnboundedReceiver<AggTradeEvent>,
        mpsc::UnboundedReceiver<FeedError>,
    ) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (errors, errors_rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelHandler { events, errors }), events_rx, errors_rx)
    }

    /// Accept one WebSocket client, send `frames`, then close.
    async fn serve_once(frames: Vec<Message>) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                ws.send(frame).await.unwrap();
            }
            let _ = ws.close(None).await;
        });

        (format!("ws://{addr}"), server)
    }

    fn btc() -> TradingPair {
        TradingPair::new("BTC", "BTCUSDT", "Binance")
    }

    fn stream_config(ws_base_url: String, max_attempts: u32) -> BinanceStreamConfig {
        BinanceStreamConfig {
            ws_base_url,
            reconnect: fast_reconnect(max_attempts),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn stream_url_lowercases_pair() {
        let config = BinanceStreamConfig {
            ws_base_url: "wss://stream.binance.com:9443/ws/".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.stream_url(&btc()),
            "wss://stream.binance.com:9443/ws/btcusdt@aggTrade"
        );
    }

    #[tokio::test]
    async fn delivers_agg_trades_and_skips_malformed() {
        let (url, _server) = serve_once(vec![
            Message::Text("garbage".into()),
            Message::Text(r#"{"e":"kline","E":1}"#.into()),
            Message::Text(AGG_TRADE.into()),
        ])
        .await;
        let feed = BinanceAggTradeFeed::new(stream_config(url, 1));
        let (handler, mut events, _errors) = channel_handler();

        let handle = feed.open_feed(&btc(), handler).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.agg_trade_id, 12345);
        assert!(!event.is_buyer_maker);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn reports_transport_error_when_reconnects_exhausted() {
        let (url, server) = serve_once(vec![]).await;
        let feed = BinanceAggTradeFeed::new(stream_config(url, 2));
        let (handler, _events, mut errors) = channel_handler();

        let _handle = feed.open_feed(&btc(), handler).await.unwrap();
        server.await.unwrap();

        let error = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(error, FeedError::Transport { .. }));
        assert!(error.to_string().contains("BTCUSDT"));
    }

    #[tokio::test]
    async fn stop_ends_feed_without_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });
        let feed = BinanceAggTradeFeed::new(stream_config(format!("ws://{addr}"), 1));
        let (handler, _events, mut errors) = channel_handler();

        let handle = feed.open_feed(&btc(), handler).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();

        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn silent_connection_is_treated_as_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            drop(listener);
            // Handshake, then neither read nor write: pings go unanswered
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = release_rx.await;
        });
        let feed = BinanceAggTradeFeed::new(BinanceStreamConfig {
            heartbeat: HeartbeatConfig::new(Duration::from_millis(50), Duration::from_millis(50)),
            ..stream_config(format!("ws://{addr}"), 1)
        });
        let (handler, _events, mut errors) = channel_handler();

        let _handle = feed.open_feed(&btc(), handler).await.unwrap();
        let error = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(error, FeedError::Transport { .. }));
        drop(release_tx);
    }

    #[tokio::test]
    async fn steady_frames_keep_connection_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for _ in 0..12 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                ws.send(Message::Text(AGG_TRADE.into())).await.unwrap();
            }
            let _ = release_rx.await;
        });
        let feed = BinanceAggTradeFeed::new(BinanceStreamConfig {
            heartbeat: HeartbeatConfig::new(Duration::from_millis(75), Duration::from_millis(75)),
            ..stream_config(format!("ws://{addr}"), 1)
        });
        let (handler, mut events, mut errors) = channel_handler();

        let handle = feed.open_feed(&btc(), handler).await.unwrap();
        for _ in 0..12 {
            tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
        }

        // Frames spanned two idle limits without a reconnect
        assert!(errors.try_recv().is_err());
        handle.shutdown().await;
        drop(release_tx);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let feed = BinanceAggTradeFeed::new(stream_config(format!("ws://{addr}"), 1));
        let (handler, _events, _errors) = channel_handler();

        let err = feed.open_feed(&btc(), handler).await.unwrap_err();
        assert!(matches!(err, FeedError::Connect(_)));
    }
}
