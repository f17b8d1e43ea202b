//! Market data resolution
//!
//! `MarketApi` is the raw provider seam (CoinGecko over HTTP in
//! production, canned responses in tests). `DataResolver` sits on top of
//! it: it runs the "query → candidate id → market snapshot" lookup and
//! the top-N listing, normalizes every record, and swallows provider
//! failures into sentinels so nothing raises past it.

use crate::models::{MarketRecord, RawCoinRecord, SearchCandidate};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod cache;
pub mod coingecko;
pub mod normalize;

pub use cache::CachedMarketApi;
pub use coingecko::CoinGeckoClient;
pub use normalize::normalize;

pub const DEFAULT_CURRENCY: &str = "usd";
pub const MARKET_CAP_DESC: &str = "market_cap_desc";

/// Parameters of one `/coins/markets` call.
///
/// Order is always market cap descending and sparkline is always off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketsRequest {
    pub vs_currency: String,
    pub ids: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl MarketsRequest {
    pub fn top(currency: &str, per_page: u32) -> Self {
        Self {
            vs_currency: currency.to_string(),
            ids: None,
            per_page: Some(per_page),
            page: Some(1),
        }
    }

    pub fn by_id(currency: &str, id: &str) -> Self {
        Self {
            vs_currency: currency.to_string(),
            ids: Some(id.to_string()),
            per_page: None,
            page: None,
        }
    }

    /// Query string pairs in the order the provider documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("vs_currency", self.vs_currency.clone())];
        if let Some(ids) = &self.ids {
            pairs.push(("ids", ids.clone()));
        }
        pairs.push(("order", MARKET_CAP_DESC.to_string()));
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs.push(("sparkline", "false".to_string()));
        pairs
    }

    pub fn cache_key(&self) -> String {
        self.query_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Raw, read-only access to the market data provider
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Free-text search; candidates in provider relevance order
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>>;

    /// Market snapshots
    async fn markets(&self, request: &MarketsRequest) -> Result<Vec<RawCoinRecord>>;
}

/// Result of a detail lookup, keeping "not found" apart from "provider down"
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Found(MarketRecord),
    NotFound,
    Unavailable,
}

impl QueryOutcome {
    pub fn found(self) -> Option<MarketRecord> {
        match self {
            QueryOutcome::Found(record) => Some(record),
            QueryOutcome::NotFound | QueryOutcome::Unavailable => None,
        }
    }
}

/// Resolves user-level requests into normalized market records
pub struct DataResolver {
    api: Arc<dyn MarketApi>,
    currency: String,
}

impl DataResolver {
    pub fn new(api: Arc<dyn MarketApi>) -> Self {
        Self {
            api,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Top `n` coins by market cap. `None` on provider failure; an empty
    /// vector means the provider answered with no rows.
    pub async fn list_top(&self, n: u32, currency: &str) -> Option<Vec<MarketRecord>> {
        let request = MarketsRequest::top(currency, n);

        match self.api.markets(&request).await {
            Ok(rows) => {
                info!(currency = %currency, requested = n, returned = rows.len(), "Top listing fetched");
                Some(rows.into_iter().map(normalize).collect())
            }
            Err(e) => {
                warn!(currency = %currency, error = %e, "Failed to fetch top listing");
                None
            }
        }
    }

    /// Two-phase lookup: search for the query, take the first candidate,
    /// fetch its market snapshot.
    pub async fn resolve_by_query(&self, query: &str) -> Option<MarketRecord> {
        self.lookup(query).await.found()
    }

    pub async fn lookup(&self, query: &str) -> QueryOutcome {
        let clean_query = query.trim().to_lowercase();

        let candidates = match self.api.search(&clean_query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(query = %clean_query, error = %e, "Coin search failed");
                return QueryOutcome::Unavailable;
            }
        };

        // First candidate wins; no ranking of our own.
        let Some(candidate) = candidates.into_iter().next() else {
            debug!(query = %clean_query, "Coin search returned no candidates");
            return QueryOutcome::NotFound;
        };

        let request = MarketsRequest::by_id(&self.currency, &candidate.id);
        let rows = match self.api.markets(&request).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(coin_id = %candidate.id, error = %e, "Market snapshot fetch failed");
                return QueryOutcome::Unavailable;
            }
        };

        match rows.into_iter().next() {
            Some(raw) => {
                info!(query = %clean_query, coin_id = %candidate.id, "Coin resolved");
                QueryOutcome::Found(normalize(raw))
            }
            None => {
                debug!(coin_id = %candidate.id, "No market snapshot for candidate");
                QueryOutcome::NotFound
            }
        }
    }
}
