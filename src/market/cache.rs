//! Response caching for the market data provider
//!
//! Two independent moka caches: markets responses expire quickly,
//! search responses (name → id) live much longer. Failures are never
//! cached.

use super::{MarketApi, MarketsRequest};
use crate::config::MarketConfig;
use crate::models::{RawCoinRecord, SearchCandidate};
use crate::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CachedMarketApi {
    inner: Arc<dyn MarketApi>,
    markets: Cache<String, Arc<Vec<RawCoinRecord>>>,
    searches: Cache<String, Arc<Vec<SearchCandidate>>>,
}

impl CachedMarketApi {
    pub fn new(
        inner: Arc<dyn MarketApi>,
        max_capacity: u64,
        listing_ttl: Duration,
        search_ttl: Duration,
    ) -> Self {
        Self {
            inner,
            markets: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(listing_ttl)
                .build(),
            searches: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(search_ttl)
                .build(),
        }
    }

    pub fn from_config(inner: Arc<dyn MarketApi>, config: &MarketConfig) -> Self {
        Self::new(
            inner,
            config.cache_capacity,
            config.listing_cache_ttl,
            config.search_cache_ttl,
        )
    }
}

#[async_trait]
impl MarketApi for CachedMarketApi {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        if let Some(hit) = self.searches.get(query).await {
            debug!(query = %query, "Search cache hit");
            return Ok(hit.as_ref().clone());
        }

        let fresh = self.inner.search(query).await?;
        self.searches
            .insert(query.to_string(), Arc::new(fresh.clone()))
            .await;
        Ok(fresh)
    }

    async fn markets(&self, request: &MarketsRequest) -> Result<Vec<RawCoinRecord>> {
        let key = request.cache_key();
        if let Some(hit) = self.markets.get(&key).await {
            debug!(key = %key, "Markets cache hit");
            return Ok(hit.as_ref().clone());
        }

        let fresh = self.inner.markets(request).await?;
        self.markets.insert(key, Arc::new(fresh.clone())).await;
        Ok(fresh)
    }
}
