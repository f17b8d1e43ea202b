//! Presentation adapter
//!
//! Turns a resolved record, a listing or an error condition into a
//! renderable unit. Surfaces (HTTP, CLI) decide how to draw it; the
//! orchestrator only needs `to_markdown()` for the history text.

use crate::models::MarketRecord;
use serde::{Deserialize, Serialize};

pub const TURN_FAILED_MESSAGE: &str =
    "There was a connection error with the assistant. Please try again.";
pub const LISTING_ERROR_MESSAGE: &str = "Market data API error.";
pub const LOOKUP_ERROR_MESSAGE: &str = "Error while looking up that coin.";
pub const NO_DATA_MESSAGE: &str = "No market data available right now.";
pub const LOADING_MESSAGE: &str = "Fetching live market data...";

const SOURCE_LINE: &str = "Source: CoinGecko";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayUnit {
    Text { content: String },
    /// Placeholder shown while a tool is still fetching
    Loading,
    CoinCard { coin: MarketRecord },
    TopTable { coins: Vec<MarketRecord> },
    NotFound { query: String },
    NoData,
    Error { message: String },
}

impl DisplayUnit {
    pub fn text(content: impl Into<String>) -> Self {
        DisplayUnit::Text {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        DisplayUnit::Error {
            message: message.into(),
        }
    }

    pub fn turn_failed() -> Self {
        Self::error(TURN_FAILED_MESSAGE)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, DisplayUnit::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DisplayUnit::Error { .. })
    }

    /// Plain-text / markdown rendering of this unit
    pub fn to_markdown(&self) -> String {
        match self {
            DisplayUnit::Text { content } => content.clone(),
            DisplayUnit::Loading => LOADING_MESSAGE.to_string(),
            DisplayUnit::CoinCard { coin } => render_card(coin),
            DisplayUnit::TopTable { coins } => render_table(coins),
            DisplayUnit::NotFound { query } => format!("I couldn't find `{}`.", query),
            DisplayUnit::NoData => NO_DATA_MESSAGE.to_string(),
            DisplayUnit::Error { message } => message.clone(),
        }
    }
}

fn render_card(coin: &MarketRecord) -> String {
    let mut out = String::new();

    out.push_str(&format!("### {} ({})\n\n", coin.name, coin.symbol));
    out.push_str(&format!(
        "**Current price:** {}\n\n",
        format_usd(coin.current_price)
    ));
    out.push_str(&format!(
        "**24h change:** {}\n\n",
        format_change(coin.price_change_percentage_24h)
    ));
    out.push_str(&format!(
        "{} • Rank #{} • Cap: ${:.2}B",
        SOURCE_LINE,
        coin.market_cap_rank,
        coin.market_cap / 1e9
    ));

    out
}

fn render_table(coins: &[MarketRecord]) -> String {
    if coins.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let mut out = String::new();
    out.push_str("| # | Coin | Price | 24h % |\n");
    out.push_str("|---|------|-------|-------|\n");

    for coin in coins {
        out.push_str(&format!(
            "| {} | {} {} | {} | {:.2}% |\n",
            coin.market_cap_rank,
            coin.name,
            coin.symbol,
            format_usd(coin.current_price),
            coin.price_change_percentage_24h,
        ));
    }

    out.push('\n');
    out.push_str(SOURCE_LINE);
    out
}

fn format_change(pct: f64) -> String {
    let marker = if pct >= 0.0 { "▲" } else { "▼" };
    format!("{} {:.2}%", marker, pct)
}

/// `$1,234.56`-style formatting; sub-dollar prices keep more precision.
fn format_usd(value: f64) -> String {
    if value.abs() < 1.0 {
        return format!("${:.6}", value);
    }

    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(rank: u32, symbol: &str, price: f64, change: f64) -> MarketRecord {
        MarketRecord {
            id: symbol.to_lowercase(),
            symbol: symbol.to_string(),
            name: format!("{} coin", symbol),
            image: String::new(),
            current_price: price,
            market_cap: 1_300_000_000_000.0,
            market_cap_rank: rank,
            price_change_percentage_24h: change,
            last_updated: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_format_usd_groups_thousands() {
        assert_eq!(format_usd(67_123.456), "$67,123.46");
        assert_eq!(format_usd(1_000.0), "$1,000.00");
        assert_eq!(format_usd(999.5), "$999.50");
        assert_eq!(format_usd(0.123456789), "$0.123457");
    }

    #[test]
    fn test_card_contains_price_direction_and_cap() {
        let unit = DisplayUnit::CoinCard {
            coin: coin(1, "BTC", 67_000.0, -1.5),
        };
        let md = unit.to_markdown();
        assert!(md.contains("(BTC)"));
        assert!(md.contains("$67,000.00"));
        assert!(md.contains("▼ -1.50%"));
        assert!(md.contains("Cap: $1300.00B"));
    }

    #[test]
    fn test_table_lists_every_coin_in_order() {
        let unit = DisplayUnit::TopTable {
            coins: vec![coin(1, "BTC", 67_000.0, 2.0), coin(2, "ETH", 3_500.0, 0.5)],
        };
        let md = unit.to_markdown();
        let btc = md.find("BTC").unwrap();
        let eth = md.find("ETH").unwrap();
        assert!(btc < eth);
        assert!(md.starts_with("| # | Coin |"));
    }

    #[test]
    fn test_not_found_and_error_messages_differ() {
        let not_found = DisplayUnit::NotFound {
            query: "notacoin123".to_string(),
        };
        assert_eq!(not_found.to_markdown(), "I couldn't find `notacoin123`.");
        assert_ne!(
            not_found.to_markdown(),
            DisplayUnit::error(LISTING_ERROR_MESSAGE).to_markdown()
        );
    }

    #[test]
    fn test_serialized_kind_tag() {
        let json = serde_json::to_value(DisplayUnit::Loading).unwrap();
        assert_eq!(json["kind"], "loading");

        let json = serde_json::to_value(DisplayUnit::text("hi")).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["content"], "hi");
    }
}
