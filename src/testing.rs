//! Test doubles for the model and the market data provider

use crate::error::ChatError;
use crate::llm::{LanguageModel, ModelRequest, ModelResponse, TextChunk};
use crate::market::{MarketApi, MarketsRequest};
use crate::models::{RawCoinRecord, SearchCandidate, ToolCall};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn raw_coin(id: &str, symbol: &str, rank: u32) -> RawCoinRecord {
    RawCoinRecord {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: id.to_string(),
        image: Some(format!("https://img/{}.png", id)),
        large: None,
        small: None,
        current_price: Some(1000.0 / rank as f64),
        market_cap: Some(1.0e12 / rank as f64),
        market_cap_rank: Some(rank),
        price_change_percentage_24h: Some(1.5),
        last_updated: Some("2024-05-01T12:00:00.000Z".to_string()),
    }
}

/// Canned market provider with call counters
#[derive(Default)]
pub struct StaticMarketApi {
    search_result: Option<Vec<SearchCandidate>>,
    markets_result: Option<Vec<RawCoinRecord>>,
    search_calls: AtomicUsize,
    markets_calls: AtomicUsize,
    last_search: Mutex<Option<String>>,
    last_markets: Mutex<Option<MarketsRequest>>,
}

impl StaticMarketApi {
    /// Both endpoints fail until configured
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, candidates: Vec<SearchCandidate>) -> Self {
        self.search_result = Some(candidates);
        self
    }

    pub fn with_markets(mut self, rows: Vec<RawCoinRecord>) -> Self {
        self.markets_result = Some(rows);
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.search_result = None;
        self
    }

    pub fn failing_markets(mut self) -> Self {
        self.markets_result = None;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn markets_calls(&self) -> usize {
        self.markets_calls.load(Ordering::SeqCst)
    }

    pub fn last_search_query(&self) -> Option<String> {
        self.last_search.lock().unwrap().clone()
    }

    pub fn last_markets_request(&self) -> Option<MarketsRequest> {
        self.last_markets.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketApi for StaticMarketApi {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_search.lock().unwrap() = Some(query.to_string());
        self.search_result
            .clone()
            .ok_or_else(|| ChatError::ProviderError("search returned 500".to_string()))
    }

    async fn markets(&self, request: &MarketsRequest) -> Result<Vec<RawCoinRecord>> {
        self.markets_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_markets.lock().unwrap() = Some(request.clone());
        self.markets_result
            .clone()
            .ok_or_else(|| ChatError::ProviderError("markets returned 503".to_string()))
    }
}

/// One queued model reply
pub enum ScriptedReply {
    /// Streamed fragments followed by `Done`
    Text(Vec<&'static str>),
    /// Fragments, then a stream error instead of `Done`
    BrokenText(Vec<&'static str>),
    ToolCall(&'static str, serde_json::Value),
    Fail(&'static str),
}

/// Model double answering from a queue and recording every request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::LlmError("script exhausted".to_string()))?;

        match reply {
            ScriptedReply::Text(fragments) => {
                let mut chunks: Vec<Result<TextChunk>> = fragments
                    .into_iter()
                    .map(|f| Ok(TextChunk::Delta(f.to_string())))
                    .collect();
                chunks.push(Ok(TextChunk::Done));
                Ok(ModelResponse::Text(stream::iter(chunks).boxed()))
            }
            ScriptedReply::BrokenText(fragments) => {
                let mut chunks: Vec<Result<TextChunk>> = fragments
                    .into_iter()
                    .map(|f| Ok(TextChunk::Delta(f.to_string())))
                    .collect();
                chunks.push(Err(ChatError::LlmError("stream interrupted".to_string())));
                Ok(ModelResponse::Text(stream::iter(chunks).boxed()))
            }
            ScriptedReply::ToolCall(name, arguments) => Ok(ModelResponse::ToolCall(ToolCall {
                name: name.to_string(),
                arguments,
            })),
            ScriptedReply::Fail(message) => Err(ChatError::LlmError(message.to_string())),
        }
    }
}
