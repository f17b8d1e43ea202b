//! CoinGecko HTTP client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{MarketApi, MarketsRequest};
use crate::config::MarketConfig;
use crate::error::ChatError;
use crate::models::{RawCoinRecord, SearchCandidate};
use crate::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCandidate>,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|e| {
                ChatError::ConfigError(format!("Invalid COINGECKO_API_KEY: {}", e))
            })?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "CoinGecko request");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(path = %path, error = %e, "CoinGecko request failed");
                ChatError::ProviderError(format!("CoinGecko request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::ProviderError(format!(
                "CoinGecko returned {} for {}: {}",
                status, path, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ChatError::ProviderError(format!("Invalid JSON response from {}: {}", path, e))
        })
    }
}

#[async_trait]
impl MarketApi for CoinGeckoClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        let response: SearchResponse = self
            .get_json("/search", &[("query", query.to_string())])
            .await?;
        Ok(response.coins)
    }

    async fn markets(&self, request: &MarketsRequest) -> Result<Vec<RawCoinRecord>> {
        self.get_json("/coins/markets", &request.query_pairs()).await
    }
}
