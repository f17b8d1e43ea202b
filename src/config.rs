//! Runtime configuration
//!
//! Everything is read from the environment (after loading `.env`).
//! Absent variables fall back to defaults; malformed numbers are errors.

use crate::error::ChatError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Model provider settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Market data provider settings
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// TTL for `/coins/markets` responses (prices move fast)
    pub listing_cache_ttl: Duration,
    /// TTL for `/search` responses (name → id mappings rarely change)
    pub search_cache_ttl: Duration,
    pub cache_capacity: u64,
    pub top_list_size: u32,
}

/// Limits on the chat sessions held by the HTTP surface
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_sessions: u64,
    /// A session untouched for this long is dropped with its history
    pub idle_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            idle_ttl: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub market: MarketConfig,
    pub sessions: SessionConfig,
    /// Connect timeout, and for streamed answers the longest silence between chunks
    pub http_timeout: Duration,
    pub port: u16,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COINGECKO_API_URL.to_string(),
            api_key: None,
            listing_cache_ttl: Duration::from_secs(60),
            search_cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1024,
            top_list_size: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: String::new(),
                model: DEFAULT_GEMINI_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            },
            market: MarketConfig::default(),
            sessions: SessionConfig::default(),
            http_timeout: Duration::from_secs(30),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and build the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm = LlmConfig {
            api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            model: get("GEMINI_MODEL").unwrap_or(defaults.llm.model),
            base_url: get("GEMINI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.llm.base_url),
        };

        let market = MarketConfig {
            base_url: get("COINGECKO_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.market.base_url),
            api_key: get("COINGECKO_API_KEY"),
            listing_cache_ttl: Duration::from_secs(parse_or(
                get("MARKET_LISTING_CACHE_TTL_SECS"),
                "MARKET_LISTING_CACHE_TTL_SECS",
                defaults.market.listing_cache_ttl.as_secs(),
            )?),
            search_cache_ttl: Duration::from_secs(parse_or(
                get("MARKET_SEARCH_CACHE_TTL_SECS"),
                "MARKET_SEARCH_CACHE_TTL_SECS",
                defaults.market.search_cache_ttl.as_secs(),
            )?),
            cache_capacity: parse_or(
                get("MARKET_CACHE_CAPACITY"),
                "MARKET_CACHE_CAPACITY",
                defaults.market.cache_capacity,
            )?,
            top_list_size: parse_or(
                get("TOP_LIST_SIZE"),
                "TOP_LIST_SIZE",
                defaults.market.top_list_size,
            )?,
        };

        let sessions = SessionConfig {
            max_sessions: parse_or(
                get("MAX_CHAT_SESSIONS"),
                "MAX_CHAT_SESSIONS",
                defaults.sessions.max_sessions,
            )?,
            idle_ttl: Duration::from_secs(parse_or(
                get("CHAT_SESSION_IDLE_SECS"),
                "CHAT_SESSION_IDLE_SECS",
                defaults.sessions.idle_ttl.as_secs(),
            )?),
        };

        let http_timeout = Duration::from_secs(parse_or(
            get("HTTP_TIMEOUT_SECS"),
            "HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        )?);

        let port = parse_or(
            get("PORT").or_else(|| get("API_PORT")),
            "PORT",
            defaults.port,
        )?;

        Ok(Self {
            llm,
            market,
            sessions,
            http_timeout,
            port,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ChatError::ConfigError(format!("{} has an invalid value: {}", key, raw))
        }),
        None => Ok(default),
    }
}
