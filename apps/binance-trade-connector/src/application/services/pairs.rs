//! Available Pairs Lookup
//!
//! Fetches the exchange symbol list once and keeps every entry the
//! normalizer accepts. Rejected entries are logged and skipped; only the
//! request itself can fail the lookup.

use std::sync::Arc;

use super::ConnectorError;
use crate::application::ports::ExchangeInfoPort;
use crate::domain::symbol::{SymbolTable, normalize};
use crate::domain::trade::TradingPair;
use crate::infrastructure::metrics;

/// One-shot fetcher of the exchange's tradable pairs.
#[derive(Clone)]
pub struct AvailablePairsFetcher {
    exchange: String,
    exchange_info: Arc<dyn ExchangeInfoPort>,
    symbols: Arc<dyn SymbolTable>,
}

impl std::fmt::Debug for AvailablePairsFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailablePairsFetcher")
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl AvailablePairsFetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        exchange_info: Arc<dyn ExchangeInfoPort>,
        symbols: Arc<dyn SymbolTable>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            exchange_info,
            symbols,
        }
    }

    /// Fetch tradable pairs with canonical symbols.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Feed` if the exchange info request or its
    /// decoding fails.
    pub async fn fetch_available_pairs(&self) -> Result<Vec<TradingPair>, ConnectorError> {
        let info = self.exchange_info.exchange_info().await?;
        let listed = info.symbols.len();

        let pairs: Vec<TradingPair> = info
            .symbols
            .into_iter()
            .filter_map(|entry| {
                let normalized = normalize(
                    &entry.symbol,
                    &entry.base_asset,
                    &entry.status,
                    self.symbols.as_ref(),
                );
                match normalized {
                    Ok(symbol) => {
                        Some(TradingPair::new(symbol, entry.symbol, self.exchange.clone()))
                    }
                    Err(e) => {
                        tracing::warn!(
                            exchange = %self.exchange,
                            pair = %entry.symbol,
                            reason = e.reason(),
                            error = %e,
                            "Skipping exchange symbol"
                        );
                        metrics::record_pair_skipped(e.reason());
                        None
                    }
                }
            })
            .collect();

        tracing::info!(
            exchange = %self.exchange,
            listed,
            available = pairs.len(),
            "Fetched available pairs"
        );
        Ok(pairs)
    }
}
