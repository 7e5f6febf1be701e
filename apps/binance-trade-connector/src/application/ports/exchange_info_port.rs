//! Exchange Info Port (Driven Port)
//!
//! Interface for the exchange's symbol list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::FeedError;

/// One listed market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// Exchange-native pair name (e.g. `BTCUSDT`).
    pub symbol: String,
    /// Exchange-native base asset (e.g. `BTC`).
    pub base_asset: String,
    /// Exchange-native quote asset (e.g. `USDT`).
    #[serde(default)]
    pub quote_asset: Option<String>,
    /// Trading status (e.g. `TRADING`, `BREAK`).
    pub status: String,
}

/// Exchange symbol list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeInfo {
    /// Listed markets.
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

/// Port for exchange metadata.
#[async_trait]
pub trait ExchangeInfoPort: Send + Sync {
    /// Fetch the current symbol list.
    async fn exchange_info(&self) -> Result<ExchangeInfo, FeedError>;
}
