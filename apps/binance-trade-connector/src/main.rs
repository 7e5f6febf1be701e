//! Binance Trade Connector Binary
//!
//! Subscribes to the configured pairs and logs every normalized trade.
//!
//! # Usage
//!
//! ```bash
//! CONNECTOR_PAIRS=BTCUSDT,ETHBTC cargo run --bin binance-trade-connector
//! ```
//!
//! # Environment Variables
//!
//! - `CONNECTOR_PAIRS`: Comma-separated exchange pair names, or `ALL` (default: none)
//! - `CONNECTOR_EXCHANGE_NAME`: Source name on trade records (default: Binance)
//! - `CONNECTOR_OUTPUT_CAPACITY`: Output stream capacity (default: 1)
//! - `CONNECTOR_SYMBOL_TABLE_PATH`: JSON symbol table (default: built-in)
//! - `CONNECTOR_SYMBOL_BLACKLIST`: Comma-separated excluded symbols
//! - `CONNECTOR_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `BINANCE_WS_BASE_URL`: Stream base URL (default: <wss://stream.binance.com:9443/ws>)
//! - `BINANCE_REST_BASE_URL`: REST base URL (default: <https://api.binance.com>)
//! - `BINANCE_HTTP_TIMEOUT_SECS`: REST timeout (default: 10)
//! - `BINANCE_RECONNECT_DELAY_INITIAL_MS`, `BINANCE_RECONNECT_DELAY_MAX_SECS`,
//!   `BINANCE_RECONNECT_DELAY_MULTIPLIER`, `BINANCE_MAX_RECONNECT_ATTEMPTS`: Feed backoff
//! - `BINANCE_HEARTBEAT_INTERVAL_SECS`, `BINANCE_HEARTBEAT_TIMEOUT_SECS`: Stale
//!   connection detection (default: 20, 20)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log filter (default: `binance_trade_connector=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use binance_trade_connector::infrastructure::binance::{
    BinanceAggTradeFeed, BinanceRestClient, BinanceRestConfig, BinanceStreamConfig,
    HeartbeatConfig, ReconnectConfig,
};
use binance_trade_connector::infrastructure::health::{HealthServer, HealthServerState};
use binance_trade_connector::infrastructure::telemetry;
use binance_trade_connector::{
    Connector, ConnectorConfig, ConnectorError, ConnectorOptions, PairSelection, PairSubscription,
    StaticSymbolTable, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for background tasks to finish after close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init()?;

    tracing::info!(
        otel_export = telemetry_guard.is_exporting(),
        "Starting Binance trade connector"
    );

    let _metrics_handle = init_metrics()?;

    let config = ConnectorConfig::from_env()?;
    log_config(&config);

    let symbols = match &config.symbols.table_path {
        Some(path) => StaticSymbolTable::from_json_file(path)
            .with_context(|| format!("loading symbol table {}", path.display()))?,
        None => StaticSymbolTable::with_defaults(),
    }
    .with_blacklist(config.symbols.blacklist.clone());
    tracing::info!(symbols = symbols.len(), "Symbol table loaded");

    let feed = BinanceAggTradeFeed::new(BinanceStreamConfig {
        ws_base_url: config.exchange.ws_base_url.clone(),
        reconnect: ReconnectConfig::from_settings(&config.websocket),
        heartbeat: HeartbeatConfig::from_settings(&config.websocket),
    });
    let rest = BinanceRestClient::new(&BinanceRestConfig {
        base_url: config.exchange.rest_base_url.clone(),
        timeout: config.exchange.http_timeout,
    })?;

    let connector = Arc::new(Connector::new(
        ConnectorOptions {
            exchange_name: config.exchange.name.clone(),
            output_capacity: config.output_capacity,
        },
        Arc::new(feed),
        Arc::new(rest),
        Arc::new(symbols),
    ));

    let shutdown_token = CancellationToken::new();

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&connector),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let consumer_task = tokio::spawn(consume_trades(Arc::clone(&connector)));

    let _subscriptions = subscribe_configured(&connector, &config.pairs).await?;

    tracing::info!("Trade connector ready");

    tokio::select! {
        () = await_shutdown() => {}
        () = connector.wait_closed() => {
            tracing::warn!("Connector stopped on its own");
        }
    }

    let outcome = match connector.close().await {
        Ok(()) => Ok(()),
        Err(ConnectorError::AlreadyClosed) => connector.error().map_or(Ok(()), Err),
        Err(e) => Err(e),
    };

    shutdown_token.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = consumer_task.await;
        let _ = health_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Background tasks did not stop in time"
        );
    }

    match outcome {
        Ok(()) => {
            tracing::info!("Trade connector stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Trade connector stopped with error");
            Err(e.into())
        }
    }
}

/// Subscribe to the pairs selected by configuration.
async fn subscribe_configured(
    connector: &Connector,
    selection: &PairSelection,
) -> anyhow::Result<Vec<PairSubscription>> {
    if *selection == PairSelection::None {
        tracing::warn!("No pairs configured; set CONNECTOR_PAIRS to subscribe");
        return Ok(Vec::new());
    }

    let available = connector
        .fetch_available_pairs()
        .await
        .context("fetching available pairs")?;

    if let PairSelection::Listed(names) = selection {
        for name in names {
            if !available
                .iter()
                .any(|p| p.foreign_name.eq_ignore_ascii_case(name))
            {
                tracing::warn!(pair = %name, "Configured pair is not available");
            }
        }
    }

    let mut subscriptions = Vec::new();
    for pair in available
        .into_iter()
        .filter(|p| selection.selects(&p.foreign_name))
    {
        match connector.subscribe(pair.clone()).await {
            Ok(subscription) => subscriptions.push(subscription),
            Err(e) => tracing::error!(pair = %pair, error = %e, "Subscription failed"),
        }
    }

    tracing::info!(count = subscriptions.len(), "Pairs subscribed");
    Ok(subscriptions)
}

/// Log trades from the output stream until it ends.
async fn consume_trades(connector: Arc<Connector>) {
    let trades = connector.output_stream();
    drop(connector);

    while let Some(trade) = trades.recv().await {
        tracing::info!(
            symbol = %trade.symbol,
            pair = %trade.pair,
            price = trade.price,
            volume = trade.volume,
            time = %trade.time,
            trade_id = %trade.foreign_trade_id,
            source = %trade.source,
            "Trade"
        );
    }

    tracing::debug!("Trade stream ended");
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ConnectorConfig) {
    tracing::info!(
        exchange = %config.exchange.name,
        pairs = ?config.pairs,
        output_capacity = config.output_capacity,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_base_url = %config.exchange.ws_base_url,
        rest_base_url = %config.exchange.rest_base_url,
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        "Exchange endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
