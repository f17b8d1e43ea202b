//! Market data tools backed by the data resolver

use super::schema::{ParameterField, ParameterKind, ParameterSchema, ToolParameters};
use super::Tool;
use crate::market::{DataResolver, QueryOutcome, DEFAULT_CURRENCY};
use crate::presentation::{DisplayUnit, LISTING_ERROR_MESSAGE, LOOKUP_ERROR_MESSAGE};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ListTopCryptosTool {
    resolver: Arc<DataResolver>,
    size: u32,
    description: String,
    schema: ParameterSchema,
}

impl ListTopCryptosTool {
    pub fn new(resolver: Arc<DataResolver>, size: u32) -> Self {
        Self {
            resolver,
            size,
            description: format!(
                "Get the ranking of the top {} cryptocurrencies by market capitalization.",
                size
            ),
            // Must stay required: an optional-only schema reaches the model
            // as an empty parameter object and the tool becomes unusable.
            schema: ParameterSchema::new(vec![ParameterField::required(
                "currency",
                ParameterKind::String,
                "Base currency, for example \"usd\"",
            )]),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ListTopCryptosTool {
    fn name(&self) -> &'static str {
        "listTopCryptos"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.schema
    }

    async fn resolve(&self, params: &ToolParameters) -> DisplayUnit {
        // The listing is always priced in USD, whatever the model passed.
        if let Some(requested) = params.get_str("currency") {
            debug!(requested = %requested, "Listing requested currency (ignored)");
        }

        match self.resolver.list_top(self.size, DEFAULT_CURRENCY).await {
            Some(coins) if coins.is_empty() => DisplayUnit::NoData,
            Some(coins) => DisplayUnit::TopTable { coins },
            None => DisplayUnit::error(LISTING_ERROR_MESSAGE),
        }
    }
}

pub struct ShowCryptoDetailTool {
    resolver: Arc<DataResolver>,
    schema: ParameterSchema,
}

impl ShowCryptoDetailTool {
    pub fn new(resolver: Arc<DataResolver>) -> Self {
        Self {
            resolver,
            schema: ParameterSchema::new(vec![ParameterField::required(
                "query",
                ParameterKind::String,
                "Coin name or symbol (e.g. bitcoin)",
            )]),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ShowCryptoDetailTool {
    fn name(&self) -> &'static str {
        "showCryptoDetail"
    }

    fn description(&self) -> &str {
        "Look up the price and details of a specific cryptocurrency."
    }

    fn parameters(&self) -> &ParameterSchema {
        &self.schema
    }

    async fn resolve(&self, params: &ToolParameters) -> DisplayUnit {
        let query = match params.required_str("query") {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "showCryptoDetail invoked without a query");
                return DisplayUnit::error(LOOKUP_ERROR_MESSAGE);
            }
        };

        match self.resolver.lookup(query).await {
            QueryOutcome::Found(coin) => DisplayUnit::CoinCard { coin },
            QueryOutcome::NotFound => DisplayUnit::NotFound {
                query: query.to_string(),
            },
            QueryOutcome::Unavailable => DisplayUnit::error(LOOKUP_ERROR_MESSAGE),
        }
    }
}
