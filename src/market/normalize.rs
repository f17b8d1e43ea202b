//! Normalization of raw provider records
//!
//! This is the only place that reads raw provider fields. Everything
//! downstream works with `MarketRecord`.

use crate::models::{MarketRecord, RawCoinRecord};

/// Convert one raw provider record into the canonical shape.
///
/// `symbol` is upper-cased and `image` is the first non-empty value of
/// `image`, `large`, `small` (empty string if none). Other fields pass
/// through; nulls become zero / empty.
pub fn normalize(raw: RawCoinRecord) -> MarketRecord {
    let image = [raw.image, raw.large, raw.small]
        .into_iter()
        .flatten()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_default();

    MarketRecord {
        id: raw.id,
        symbol: raw.symbol.to_uppercase(),
        name: raw.name,
        image,
        current_price: raw.current_price.unwrap_or_default(),
        market_cap: raw.market_cap.unwrap_or_default(),
        market_cap_rank: raw.market_cap_rank.unwrap_or_default(),
        price_change_percentage_24h: raw.price_change_percentage_24h.unwrap_or_default(),
        last_updated: raw.last_updated.unwrap_or_default(),
    }
}
