//! Exchange Info REST Client
//!
//! `ExchangeInfoPort` adapter for `GET /api/v3/exchangeInfo`. The endpoint
//! is public; no API key is sent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::messages::ApiErrorBody;
use crate::application::ports::{ExchangeInfo, ExchangeInfoPort, FeedError};

const EXCHANGE_INFO_PATH: &str = "/api/v3/exchangeInfo";

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct BinanceRestConfig {
    /// API base URL.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for BinanceRestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the Binance spot REST API.
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    client: Client,
    base_url: String,
}

impl BinanceRestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::Connect` if the HTTP client cannot be built.
    pub fn new(config: &BinanceRestConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ExchangeInfoPort for BinanceRestClient {
    async fn exchange_info(&self) -> Result<ExchangeInfo, FeedError> {
        let url = self.url(EXCHANGE_INFO_PATH);
        tracing::debug!(url = %url, "Fetching exchange info");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Transport {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            let body = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or(body, |err| err.to_string());
            tracing::warn!(
                status = status.as_u16(),
                body = %body,
                "Exchange info request rejected"
            );
            return Err(FeedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| FeedError::Decode(e.to_string()))
    }
}
