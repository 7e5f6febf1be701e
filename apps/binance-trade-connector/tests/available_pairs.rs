//! Available Pairs Integration Tests
//!
//! Exchange info served over HTTP, normalized through a symbol table file.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use binance_trade_connector::infrastructure::binance::{BinanceRestClient, BinanceRestConfig};
use binance_trade_connector::{
    Connector, ConnectorError, ConnectorOptions, FeedError, FeedHandle, FeedHandler,
    StaticSymbolTable, TradingPair, VenueFeed,
};

const EXCHANGE_INFO: &str = r#"{
    "timezone": "UTC",
    "serverTime": 1700000000000,
    "rateLimits": [],
    "symbols": [
        {"symbol": "BTCUSDT", "status": "TRADING", "baseAsset": "BTC", "quoteAsset": "USDT"},
        {"symbol": "ETHBTC", "status": "TRADING", "baseAsset": "ETH", "quoteAsset": "BTC"},
        {"symbol": "IOTABTC", "status": "TRADING", "baseAsset": "IOTA", "quoteAsset": "BTC"},
        {"symbol": "BCCBTC", "status": "BREAK", "baseAsset": "BCC", "quoteAsset": "BTC"},
        {"symbol": "ZZZBTC", "status": "TRADING", "baseAsset": "ZZZ", "quoteAsset": "BTC"},
        {"symbol": "SCAMBTC", "status": "TRADING", "baseAsset": "SCAM", "quoteAsset": "BTC"}
    ]
}"#;

struct NeverOpens;

#[async_trait]
impl VenueFeed for NeverOpens {
    async fn open_feed(
        &self,
        pair: &TradingPair,
        _handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError> {
        Err(FeedError::Connect(format!("{pair} not reachable")))
    }
}

const SYMBOL_TABLE: &str = r#"{
    "names": {
        "BTC": "Bitcoin",
        "ETH": "Ethereum",
        "MIOTA": "Iota",
        "BCH": "Bitcoin Cash",
        "SCAM": "Scam Coin"
    },
    "blacklist": ["SCAM"]
}"#;

fn table_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn symbol_table_file() -> NamedTempFile {
    table_file(SYMBOL_TABLE)
}

async fn mount_exchange_info(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EXCHANGE_INFO))
        .expect(times)
        .mount(server)
        .await;
}

async fn connector_for(server: &MockServer, table: &NamedTempFile) -> Connector {
    let rest = BinanceRestClient::new(&BinanceRestConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let symbols = StaticSymbolTable::from_json_file(table.path()).unwrap();

    Connector::new(
        ConnectorOptions::default(),
        Arc::new(NeverOpens),
        Arc::new(rest),
        Arc::new(symbols),
    )
}

#[tokio::test]
async fn fetch_skips_unusable_entries_and_keeps_the_rest() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, 1).await;
    let table = symbol_table_file();
    let connector = connector_for(&server, &table).await;

    let pairs = connector.fetch_available_pairs().await.unwrap();

    let listed: Vec<(&str, &str, &str)> = pairs
        .iter()
        .map(|p| (p.symbol.as_str(), p.foreign_name.as_str(), p.exchange.as_str()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("BTC", "BTCUSDT", "Binance"),
            ("ETH", "ETHBTC", "Binance"),
            ("MIOTA", "IOTABTC", "Binance"),
        ]
    );
}

#[tokio::test]
async fn venue_ticker_kept_when_it_is_a_known_name() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, 1).await;
    let table = table_file(r#"{"names": {"BTC": "Bitcoin", "ETH": "Ethereum", "MIOTA": "IOTA"}}"#);
    let connector = connector_for(&server, &table).await;

    let pairs = connector.fetch_available_pairs().await.unwrap();

    let iota = pairs.iter().find(|p| p.foreign_name == "IOTABTC").unwrap();
    assert_eq!(iota.symbol, "IOTA");
    assert_eq!(pairs.len(), 3);
}

#[tokio::test]
async fn fetch_surfaces_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(
            ResponseTemplate::new(418)
                .set_body_string(r#"{"code":-1003,"msg":"Way too many requests"}"#),
        )
        .mount(&server)
        .await;
    let table = symbol_table_file();
    let connector = connector_for(&server, &table).await;

    let err = connector.fetch_available_pairs().await.unwrap_err();

    assert!(matches!(err, ConnectorError::Feed(FeedError::Api { status: 418, .. })));
    assert!(!connector.is_closed());
}

#[tokio::test]
async fn fetch_works_without_subscriptions_and_after_close() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, 2).await;
    let table = symbol_table_file();
    let connector = connector_for(&server, &table).await;

    assert_eq!(connector.fetch_available_pairs().await.unwrap().len(), 3);

    connector.close().await.unwrap();

    assert_eq!(connector.fetch_available_pairs().await.unwrap().len(), 3);
}

#[tokio::test]
async fn subscribe_reports_feed_open_failure() {
    let server = MockServer::start().await;
    let table = symbol_table_file();
    let connector = connector_for(&server, &table).await;

    let err = connector
        .subscribe(TradingPair::new("BTC", "BTCUSDT", "Binance"))
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::Feed(FeedError::Connect(_))));
    assert_eq!(connector.stats().pair_count, 0);
    assert!(!connector.is_closed());
}
