//! Per-symbol book state.
//!
//! Owns the two sorted sides, applies full and partial updates, validates,
//! and derives the published snapshot fields. Mutations are applied to a
//! candidate first; a rejected update leaves the previous valid book intact.

use crate::error::{BookError, BookResult};
use crate::normalize::NormalizedUpdate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};
use truex_core::{
    BookSide, BookSnapshot, BookSource, Delta, DeltaAction, Price, PriceLevel, Size,
};

/// Book validation and buffering knobs.
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Rolling snapshot buffer capacity for volatility scoring.
    pub buffer_size: usize,
    /// Accept bid >= ask up to this percentage deviation.
    pub inversion_tolerance_pct: f64,
    /// Spread-deviation ratio beyond which a snapshot is flagged volatile.
    pub volatility_threshold: f64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            buffer_size: 20,
            inversion_tolerance_pct: 1.0,
            volatility_threshold: 0.5,
        }
    }
}

/// Replacement levels for one side, already normalized.
pub type SideUpdate = Vec<PriceLevel>;

/// Sorted side: canonical price -> size. Iteration order is ascending;
/// bids are read in reverse.
type Ladder = BTreeMap<Decimal, Decimal>;

/// Authoritative two-sided book for one symbol.
pub struct BookState {
    symbol: String,
    config: BookConfig,
    bids: Ladder,
    asks: Ladder,
    seen_bids: bool,
    seen_asks: bool,
    last_valid: Option<BookSnapshot>,
    /// Last N published snapshots, oldest first.
    buffer: VecDeque<BookSnapshot>,
}

impl BookState {
    pub fn new(symbol: impl Into<String>, config: BookConfig) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            bids: Ladder::new(),
            asks: Ladder::new(),
            seen_bids: false,
            seen_asks: false,
            last_valid: None,
            buffer: VecDeque::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Latest snapshot that passed validation, if any.
    pub fn last_valid(&self) -> Option<&BookSnapshot> {
        self.last_valid.as_ref()
    }

    /// Number of snapshots in the volatility buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Apply a normalized update.
    ///
    /// Both sides non-empty replaces the whole book; a single present side
    /// replaces only that side and marks the snapshot partial. The first
    /// update establishes the book, but nothing is published until both
    /// sides have been seen. Zero-size levels delete their price.
    pub fn apply(&mut self, update: NormalizedUpdate) -> BookResult<BookSnapshot> {
        let bids_in = update.bids.filter(|v| !v.is_empty());
        let asks_in = update.asks.filter(|v| !v.is_empty());

        if bids_in.is_none() && asks_in.is_none() {
            return Err(BookError::EmptyUpdate {
                symbol: self.symbol.clone(),
            });
        }

        let is_partial = !(bids_in.is_some() && asks_in.is_some());

        let candidate_bids = match &bids_in {
            Some(levels) => build_ladder(levels),
            None => self.bids.clone(),
        };
        let candidate_asks = match &asks_in {
            Some(levels) => build_ladder(levels),
            None => self.asks.clone(),
        };

        self.commit(
            candidate_bids,
            candidate_asks,
            bids_in.is_some(),
            asks_in.is_some(),
            is_partial,
            update.source,
            update.timestamp_ms,
        )
    }

    /// Apply incremental deltas from a 35=X refresh, in order.
    pub fn apply_deltas(
        &mut self,
        deltas: &[Delta],
        source: BookSource,
        timestamp_ms: i64,
    ) -> BookResult<BookSnapshot> {
        if deltas.is_empty() {
            return Err(BookError::EmptyUpdate {
                symbol: self.symbol.clone(),
            });
        }

        let mut candidate_bids = self.bids.clone();
        let mut candidate_asks = self.asks.clone();
        let mut touched_bids = false;
        let mut touched_asks = false;

        for delta in deltas {
            let ladder = match delta.side {
                BookSide::Bid => {
                    touched_bids = true;
                    &mut candidate_bids
                }
                BookSide::Ask => {
                    touched_asks = true;
                    &mut candidate_asks
                }
            };
            match delta.action {
                DeltaAction::New | DeltaAction::Change => {
                    if delta.size.is_zero() {
                        ladder.remove(&delta.price.canonical());
                    } else {
                        ladder.insert(delta.price.canonical(), delta.size.inner());
                    }
                }
                DeltaAction::Delete => {
                    ladder.remove(&delta.price.canonical());
                }
            }
        }

        self.commit(
            candidate_bids,
            candidate_asks,
            touched_bids,
            touched_asks,
            true,
            source,
            timestamp_ms,
        )
    }

    /// Validate a candidate book and commit it if acceptable.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &mut self,
        bids: Ladder,
        asks: Ladder,
        updated_bids: bool,
        updated_asks: bool,
        is_partial: bool,
        source: BookSource,
        timestamp_ms: i64,
    ) -> BookResult<BookSnapshot> {
        // An update that empties a side we have already seen is invalid and
        // must not clobber the previous book.
        if self.seen_bids && bids.is_empty() {
            return Err(BookError::InvalidBest {
                symbol: self.symbol.clone(),
                reason: "update would empty the bid side".to_string(),
            });
        }
        if self.seen_asks && asks.is_empty() {
            return Err(BookError::InvalidBest {
                symbol: self.symbol.clone(),
                reason: "update would empty the ask side".to_string(),
            });
        }

        let seen_bids = self.seen_bids || updated_bids;
        let seen_asks = self.seen_asks || updated_asks;

        // First one-sided updates establish the book but publish nothing.
        if bids.is_empty() || asks.is_empty() {
            self.bids = bids;
            self.asks = asks;
            self.seen_bids = seen_bids;
            self.seen_asks = seen_asks;
            debug!(symbol = %self.symbol, "book established, waiting for the other side");
            return Err(BookError::NotTwoSided {
                symbol: self.symbol.clone(),
            });
        }

        let (&best_bid, &best_bid_size) = bids.iter().next_back().expect("bids non-empty");
        let (&best_ask, &best_ask_size) = asks.iter().next().expect("asks non-empty");

        if best_bid <= Decimal::ZERO || best_ask <= Decimal::ZERO {
            return Err(BookError::InvalidBest {
                symbol: self.symbol.clone(),
                reason: format!("non-positive best prices: bid {best_bid}, ask {best_ask}"),
            });
        }

        let mut is_inverted = false;
        let mut validation_reason = None;
        if best_bid >= best_ask {
            let inversion_pct = ((best_bid - best_ask) / best_ask * Decimal::from(100))
                .to_f64()
                .unwrap_or(f64::INFINITY);
            if inversion_pct > self.config.inversion_tolerance_pct {
                return Err(BookError::SevereInversion {
                    symbol: self.symbol.clone(),
                    bid: best_bid.to_string(),
                    ask: best_ask.to_string(),
                    pct: inversion_pct,
                });
            }
            is_inverted = true;
            validation_reason = Some(format!(
                "inversion within tolerance: bid {best_bid} >= ask {best_ask} ({inversion_pct:.3}%)"
            ));
            warn!(
                symbol = %self.symbol,
                bid = %best_bid,
                ask = %best_ask,
                pct = inversion_pct,
                "publishing inverted book within tolerance"
            );
        }

        let mid = (best_bid + best_ask) / Decimal::TWO;
        let spread = best_ask - best_bid;
        let spread_percentage = if mid.is_zero() {
            0.0
        } else {
            (spread / mid).to_f64().unwrap_or(0.0)
        };

        let is_volatile = self.spread_is_volatile(spread);

        let snapshot = BookSnapshot {
            symbol: self.symbol.clone(),
            timestamp_ms,
            source,
            bids: ladder_to_levels(&bids, true),
            asks: ladder_to_levels(&asks, false),
            has_complete_bids: seen_bids,
            has_complete_asks: seen_asks,
            is_partial_update: is_partial,
            best_bid: Some(Price::new(best_bid)),
            best_bid_size: Some(Size::new(best_bid_size)),
            best_ask: Some(Price::new(best_ask)),
            best_ask_size: Some(Size::new(best_ask_size)),
            mid_price: Some(Price::new(mid)),
            spread: Some(Price::new(spread)),
            spread_percentage: Some(spread_percentage),
            is_inverted,
            is_volatile,
            validation_reason,
        };

        self.bids = bids;
        self.asks = asks;
        self.seen_bids = seen_bids;
        self.seen_asks = seen_asks;
        self.buffer.push_back(snapshot.clone());
        while self.buffer.len() > self.config.buffer_size {
            self.buffer.pop_front();
        }
        self.last_valid = Some(snapshot.clone());

        Ok(snapshot)
    }

    /// Spread deviation against the rolling mean of prior snapshots.
    ///
    /// Requires at least 3 prior snapshots in the buffer.
    fn spread_is_volatile(&self, spread: Decimal) -> bool {
        if self.buffer.len() < 3 {
            return false;
        }
        let spreads: Vec<f64> = self
            .buffer
            .iter()
            .filter_map(|s| s.spread)
            .map(|p| p.to_f64())
            .collect();
        if spreads.len() < 3 {
            return false;
        }
        let mean: f64 = spreads.iter().sum::<f64>() / spreads.len() as f64;
        if mean == 0.0 {
            return false;
        }
        let current = spread.to_f64().unwrap_or(0.0);
        ((current - mean).abs() / mean) > self.config.volatility_threshold
    }
}

/// Build a ladder from normalized levels. Later entries win price ties and
/// zero sizes delete the level.
fn build_ladder(levels: &[PriceLevel]) -> Ladder {
    let mut ladder = Ladder::new();
    for level in levels {
        if level.size.is_zero() {
            ladder.remove(&level.price.canonical());
        } else {
            ladder.insert(level.price.canonical(), level.size.inner());
        }
    }
    ladder
}

fn ladder_to_levels(ladder: &Ladder, descending: bool) -> Vec<PriceLevel> {
    let iter = ladder
        .iter()
        .map(|(p, s)| PriceLevel::new(Price::new(*p), Size::new(*s)));
    if descending {
        iter.rev().collect()
    } else {
        iter.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal) -> PriceLevel {
        PriceLevel::new(Price::new(price), Size::new(size))
    }

    fn full_update(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> NormalizedUpdate {
        NormalizedUpdate::from_levels("BTC-PYUSD", BookSource::Fix, Some(bids), Some(asks))
    }

    fn seeded_book() -> BookState {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());
        book.apply(full_update(
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            vec![level(dec!(101), dec!(1)), level(dec!(102), dec!(3))],
        ))
        .unwrap();
        book
    }

    #[test]
    fn test_full_snapshot_publishes_sorted_sides() {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());
        let snap = book
            .apply(full_update(
                vec![level(dec!(99), dec!(2)), level(dec!(100), dec!(1))],
                vec![level(dec!(102), dec!(3)), level(dec!(101), dec!(1))],
            ))
            .unwrap();

        assert_eq!(snap.bids[0].price.inner(), dec!(100));
        assert_eq!(snap.bids[1].price.inner(), dec!(99));
        assert_eq!(snap.asks[0].price.inner(), dec!(101));
        assert_eq!(snap.asks[1].price.inner(), dec!(102));
        assert_eq!(snap.best_bid.unwrap().inner(), dec!(100));
        assert_eq!(snap.best_ask.unwrap().inner(), dec!(101));
        assert_eq!(snap.mid_price.unwrap().inner(), dec!(100.5));
        assert_eq!(snap.spread.unwrap().inner(), dec!(1));
        assert!(!snap.is_partial_update);
        assert!(!snap.is_inverted);
    }

    #[test]
    fn test_severe_inversion_rejected_previous_retained() {
        let mut book = seeded_book();

        // Partial bids at 103 against resting ask 101: ~1.98% inversion.
        let err = book
            .apply(NormalizedUpdate::from_levels(
                "BTC-PYUSD",
                BookSource::Fix,
                Some(vec![level(dec!(103), dec!(1))]),
                None,
            ))
            .unwrap_err();

        assert!(matches!(err, BookError::SevereInversion { .. }));
        let last = book.last_valid().unwrap();
        assert_eq!(last.best_bid.unwrap().inner(), dec!(100));
        assert_eq!(last.best_ask.unwrap().inner(), dec!(101));
    }

    #[test]
    fn test_small_inversion_published_with_flag() {
        let mut book = seeded_book();

        // Bid 101.5 over ask 101 is ~0.495%: inside the 1% tolerance.
        let snap = book
            .apply(NormalizedUpdate::from_levels(
                "BTC-PYUSD",
                BookSource::Fix,
                Some(vec![level(dec!(101.5), dec!(1))]),
                None,
            ))
            .unwrap();

        assert!(snap.is_inverted);
        assert!(snap.validation_reason.is_some());
    }

    #[test]
    fn test_partial_side_replace() {
        let mut book = seeded_book();

        let snap = book
            .apply(NormalizedUpdate::from_levels(
                "BTC-PYUSD",
                BookSource::Fix,
                None,
                Some(vec![level(dec!(101.5), dec!(2))]),
            ))
            .unwrap();

        assert!(snap.is_partial_update);
        assert_eq!(snap.asks.len(), 1);
        assert_eq!(snap.best_ask.unwrap().inner(), dec!(101.5));
        assert_eq!(snap.best_ask_size.unwrap().inner(), dec!(2));
        // Bids preserved from the previous book.
        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.best_bid.unwrap().inner(), dec!(100));
    }

    #[test]
    fn test_one_sided_book_not_published_until_complete() {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());

        let err = book
            .apply(NormalizedUpdate::from_levels(
                "BTC-PYUSD",
                BookSource::Fix,
                Some(vec![level(dec!(100), dec!(1))]),
                None,
            ))
            .unwrap_err();
        assert!(matches!(err, BookError::NotTwoSided { .. }));
        assert!(book.last_valid().is_none());

        // The other side arrives: the book becomes publishable.
        let snap = book
            .apply(NormalizedUpdate::from_levels(
                "BTC-PYUSD",
                BookSource::Fix,
                None,
                Some(vec![level(dec!(101), dec!(1))]),
            ))
            .unwrap();
        assert_eq!(snap.best_bid.unwrap().inner(), dec!(100));
        assert_eq!(snap.best_ask.unwrap().inner(), dec!(101));
    }

    #[test]
    fn test_idempotent_snapshot_application() {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());
        let update = full_update(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );

        let first = book.apply(update.clone()).unwrap();
        let second = book.apply(update).unwrap();

        assert_eq!(first.bids, second.bids);
        assert_eq!(first.asks, second.asks);
        assert_eq!(first.best_bid, second.best_bid);
        assert_eq!(first.best_ask, second.best_ask);
    }

    #[test]
    fn test_price_tie_coalesced_last_write_wins() {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());
        let snap = book
            .apply(full_update(
                vec![level(dec!(100), dec!(1)), level(dec!(100.0), dec!(5))],
                vec![level(dec!(101), dec!(1))],
            ))
            .unwrap();

        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.best_bid_size.unwrap().inner(), dec!(5));
    }

    #[test]
    fn test_deltas_upsert_and_delete() {
        let mut book = seeded_book();

        let snap = book
            .apply_deltas(
                &[
                    Delta {
                        action: DeltaAction::Change,
                        side: BookSide::Bid,
                        price: Price::new(dec!(100)),
                        size: Size::new(dec!(4)),
                    },
                    Delta {
                        action: DeltaAction::Delete,
                        side: BookSide::Ask,
                        price: Price::new(dec!(101)),
                        size: Size::ZERO,
                    },
                    Delta {
                        action: DeltaAction::New,
                        side: BookSide::Ask,
                        price: Price::new(dec!(101.25)),
                        size: Size::new(dec!(2)),
                    },
                ],
                BookSource::Fix,
                1,
            )
            .unwrap();

        assert_eq!(snap.best_bid_size.unwrap().inner(), dec!(4));
        assert_eq!(snap.best_ask.unwrap().inner(), dec!(101.25));
        assert!(snap.is_partial_update);
    }

    #[test]
    fn test_update_emptying_seen_side_rejected() {
        let mut book = seeded_book();

        let err = book
            .apply_deltas(
                &[
                    Delta {
                        action: DeltaAction::Delete,
                        side: BookSide::Ask,
                        price: Price::new(dec!(101)),
                        size: Size::ZERO,
                    },
                    Delta {
                        action: DeltaAction::Delete,
                        side: BookSide::Ask,
                        price: Price::new(dec!(102)),
                        size: Size::ZERO,
                    },
                ],
                BookSource::Fix,
                1,
            )
            .unwrap_err();

        assert!(matches!(err, BookError::InvalidBest { .. }));
        assert_eq!(book.last_valid().unwrap().asks.len(), 2);
    }

    #[test]
    fn test_volatility_flag_from_buffer() {
        let mut book = BookState::new("BTC-PYUSD", BookConfig::default());

        // Three stable publications with spread 1.
        for _ in 0..3 {
            book.apply(full_update(
                vec![level(dec!(100), dec!(1))],
                vec![level(dec!(101), dec!(1))],
            ))
            .unwrap();
        }

        // Spread widens to 4: deviation (4-1.? ) well beyond 50%.
        let snap = book
            .apply(full_update(
                vec![level(dec!(100), dec!(1))],
                vec![level(dec!(104), dec!(1))],
            ))
            .unwrap();
        assert!(snap.is_volatile);

        // A stable spread right after is not volatile relative to the mean.
        let calm = book
            .apply(full_update(
                vec![level(dec!(100), dec!(1))],
                vec![level(dec!(101), dec!(1))],
            ))
            .unwrap();
        assert!(!calm.is_volatile);
    }

    #[test]
    fn test_buffer_capped() {
        let config = BookConfig {
            buffer_size: 5,
            ..Default::default()
        };
        let mut book = BookState::new("BTC-PYUSD", config);
        for _ in 0..12 {
            book.apply(full_update(
                vec![level(dec!(100), dec!(1))],
                vec![level(dec!(101), dec!(1))],
            ))
            .unwrap();
        }
        assert_eq!(book.buffered(), 5);
    }
}
