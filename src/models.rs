//! Core data models for the crypto chat agent

use crate::presentation::DisplayUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation history sent to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    #[serde(default = "chrono::Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The displayable outcome of one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub id: String,
    pub role: Role,
    pub display: DisplayUnit,
    pub created_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn assistant(id: impl Into<String>, display: DisplayUnit) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            display,
            created_at: Utc::now(),
        }
    }
}

/// An intermediate display emitted while a turn is still running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnUpdate {
    pub turn_id: String,
    pub display: DisplayUnit,
}

pub fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}

//
// ================= Market Data =================
//

/// Canonical, normalized market snapshot of one coin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketRecord {
    pub id: String,
    /// Always upper-case
    pub symbol: String,
    pub name: String,
    /// Empty when the provider sent no image at all
    pub image: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub market_cap_rank: u32,
    pub price_change_percentage_24h: f64,
    pub last_updated: String,
}

/// Raw coin record as returned by the provider.
///
/// The image arrives under `image`, `large` or `small` depending on the
/// endpoint; numeric fields can be null for thinly traded coins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCoinRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl From<&MarketRecord> for RawCoinRecord {
    fn from(record: &MarketRecord) -> Self {
        Self {
            id: record.id.clone(),
            symbol: record.symbol.clone(),
            name: record.name.clone(),
            image: Some(record.image.clone()),
            large: None,
            small: None,
            current_price: Some(record.current_price),
            market_cap: Some(record.market_cap),
            market_cap_rank: Some(record.market_cap_rank),
            price_change_percentage_24h: Some(record.price_change_percentage_24h),
            last_updated: Some(record.last_updated.clone()),
        }
    }
}

/// One hit of the provider's free-text search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchCandidate {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default, rename = "thumb")]
    pub thumbnail: String,
}

//
// ================= Tool I/O =================
//

/// A tool selection made by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{}", s)
    }
}
