//! Payload normalization.
//!
//! Exchange feeds disagree on book payload shape: TrueX-style standard
//! payloads use `bids`/`asks`, Kraken snapshots use `bs`/`as`, Kraken
//! incrementals use `b`/`a`, and levels arrive either as `[price, size]`
//! arrays (possibly with trailing timestamps) or `{price, qty}` objects.
//! Everything is coerced into one [`NormalizedUpdate`] of canonical decimal
//! levels; downstream code never sees the raw shapes.

use crate::error::{BookError, BookResult};
use chrono::Utc;
use serde_json::Value;
use truex_core::{BookSource, Price, PriceLevel, Size};

/// A normalized book update: one or both sides of canonical levels.
///
/// `None` means the side was absent from the payload; an absent side is
/// merged from the previous book (partial update). Levels with zero size
/// delete the price from the side they target.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUpdate {
    pub symbol: String,
    pub source: BookSource,
    pub timestamp_ms: i64,
    pub bids: Option<Vec<PriceLevel>>,
    pub asks: Option<Vec<PriceLevel>>,
}

impl NormalizedUpdate {
    /// Build an update directly from already-parsed levels.
    pub fn from_levels(
        symbol: impl Into<String>,
        source: BookSource,
        bids: Option<Vec<PriceLevel>>,
        asks: Option<Vec<PriceLevel>>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            source,
            timestamp_ms: Utc::now().timestamp_millis(),
            bids,
            asks,
        }
    }

    /// True when both sides are present with at least one level each.
    pub fn is_full(&self) -> bool {
        matches!((&self.bids, &self.asks), (Some(b), Some(a)) if !b.is_empty() && !a.is_empty())
    }
}

/// Normalize a raw JSON payload into a [`NormalizedUpdate`].
///
/// Recognized shapes, in order:
/// 1. Standard: `bids` / `asks`
/// 2. Kraken snapshot: `bs` / `as`
/// 3. Kraken incremental: `b` / `a`
///
/// Unknown shapes are rejected with [`BookError::UnknownFormat`] and the
/// update is dropped by the caller.
pub fn normalize_payload(
    symbol: &str,
    source: BookSource,
    payload: &Value,
) -> BookResult<NormalizedUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| BookError::UnknownFormat("payload is not an object".to_string()))?;

    let (bid_key, ask_key) = if obj.contains_key("bids") || obj.contains_key("asks") {
        ("bids", "asks")
    } else if obj.contains_key("bs") || obj.contains_key("as") {
        ("bs", "as")
    } else if obj.contains_key("b") || obj.contains_key("a") {
        ("b", "a")
    } else {
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        return Err(BookError::UnknownFormat(format!(
            "no bid/ask keys among {keys:?}"
        )));
    };

    let bids = obj.get(bid_key).map(parse_side).transpose()?;
    let asks = obj.get(ask_key).map(parse_side).transpose()?;

    if bids.is_none() && asks.is_none() {
        return Err(BookError::EmptyUpdate {
            symbol: symbol.to_string(),
        });
    }

    Ok(NormalizedUpdate {
        symbol: symbol.to_string(),
        source,
        timestamp_ms: Utc::now().timestamp_millis(),
        bids,
        asks,
    })
}

fn parse_side(raw: &Value) -> BookResult<Vec<PriceLevel>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| BookError::UnknownFormat("side is not an array".to_string()))?;
    entries.iter().map(parse_level).collect()
}

/// Parse one level: `[price, size, ...]` or `{price, qty|size}`.
fn parse_level(raw: &Value) -> BookResult<PriceLevel> {
    match raw {
        Value::Array(items) if items.len() >= 2 => {
            let price = parse_decimal(&items[0])?;
            let size = parse_decimal(&items[1])?;
            Ok(PriceLevel::new(Price::new(price), Size::new(size)))
        }
        Value::Object(map) => {
            let price = map
                .get("price")
                .ok_or_else(|| BookError::UnparseableLevel("missing price".to_string()))?;
            let size = map
                .get("qty")
                .or_else(|| map.get("size"))
                .ok_or_else(|| BookError::UnparseableLevel("missing qty".to_string()))?;
            Ok(PriceLevel::new(
                Price::new(parse_decimal(price)?),
                Size::new(parse_decimal(size)?),
            ))
        }
        other => Err(BookError::UnparseableLevel(format!(
            "unsupported level shape: {other}"
        ))),
    }
}

/// Coerce a JSON string or number to a decimal without a float round trip.
fn parse_decimal(raw: &Value) -> BookResult<rust_decimal::Decimal> {
    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(BookError::UnparseableLevel(format!(
                "expected string or number, got {other}"
            )))
        }
    };
    text.parse()
        .map_err(|e| BookError::UnparseableLevel(format!("{text}: {e}")))
}
