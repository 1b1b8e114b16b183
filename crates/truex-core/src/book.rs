//! Order book domain types.
//!
//! A [`BookSnapshot`] is the published, validated view of a two-sided book.
//! Bids are sorted strictly descending by price, asks strictly ascending,
//! and derived fields (mid, spread, inversion, volatility) are computed at
//! publication time.

use crate::{Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single price level: full-precision price and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub size: Size,
}

impl PriceLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.size, self.price)
    }
}

/// Where a book update originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSource {
    /// TrueX FIX market data (35=W / 35=X).
    Fix,
    /// Kraken WebSocket feed.
    KrakenWs,
    /// Pre-normalized payload pushed by an embedding process.
    External,
}

impl fmt::Display for BookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fix => write!(f, "fix"),
            Self::KrakenWs => write!(f, "kraken_ws"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Incremental update action (MDUpdateAction, tag 279).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAction {
    New,
    Change,
    Delete,
}

impl DeltaAction {
    /// Parse a FIX tag 279 value.
    pub fn from_fix(v: &str) -> Option<Self> {
        match v {
            "0" => Some(Self::New),
            "1" => Some(Self::Change),
            "2" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Which side of the book a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSide {
    Bid,
    Ask,
}

/// One incremental book mutation from a 35=X refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub action: DeltaAction,
    pub side: BookSide,
    pub price: Price,
    pub size: Size,
}

/// Published order book snapshot.
///
/// Invariant: when both sides are complete, either `best_bid < best_ask` or
/// `is_inverted` is set and the inversion is within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub source: BookSource,
    /// Bid levels, strictly descending by price.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, strictly ascending by price.
    pub asks: Vec<PriceLevel>,
    /// True once a full bid side has been observed.
    pub has_complete_bids: bool,
    /// True once a full ask side has been observed.
    pub has_complete_asks: bool,
    /// True when this publication merged only one side.
    pub is_partial_update: bool,
    pub best_bid: Option<Price>,
    pub best_bid_size: Option<Size>,
    pub best_ask: Option<Price>,
    pub best_ask_size: Option<Size>,
    pub mid_price: Option<Price>,
    pub spread: Option<Price>,
    /// Spread as a fraction of mid.
    pub spread_percentage: Option<f64>,
    /// Best bid at or above best ask, within tolerance.
    pub is_inverted: bool,
    /// Spread deviates from the rolling mean by more than the threshold.
    pub is_volatile: bool,
    /// Populated when validation degraded or annotated the snapshot.
    pub validation_reason: Option<String>,
}

impl BookSnapshot {
    /// Empty snapshot scaffold for a symbol.
    pub fn empty(symbol: impl Into<String>, source: BookSource) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp_ms: 0,
            source,
            bids: Vec::new(),
            asks: Vec::new(),
            has_complete_bids: false,
            has_complete_asks: false,
            is_partial_update: false,
            best_bid: None,
            best_bid_size: None,
            best_ask: None,
            best_ask_size: None,
            mid_price: None,
            spread: None,
            spread_percentage: None,
            is_inverted: false,
            is_volatile: false,
            validation_reason: None,
        }
    }

    /// Both sides present with at least one level each.
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_snapshot() {
        let snap = BookSnapshot::empty("BTC-PYUSD", BookSource::Fix);
        assert!(!snap.is_two_sided());
        assert!(snap.best_bid.is_none());
        assert!(!snap.is_inverted);
    }

    #[test]
    fn test_price_level_display() {
        let level = PriceLevel::new(Price::new(dec!(101.5)), Size::new(dec!(2)));
        assert_eq!(level.to_string(), "2@101.5");
    }
}
