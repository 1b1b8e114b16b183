//! FIX market-data message demultiplexing.
//!
//! A 35=W snapshot replaces the whole book for its symbol; a 35=X
//! incremental yields an ordered delta stream; trade entries (269=2) in
//! either become trade prints. 35=Y deletes the subscription upstream and
//! surfaces the reject reason.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use tracing::debug;
use truex_core::{BookSide, Delta, DeltaAction, OrderSide, Price, PriceLevel, Size};
use truex_fix::{tags, FixMessage, GroupEntry, MsgType};

/// Tags an MD entry group may carry.
const MD_ENTRY_MEMBERS: &[u32] = &[
    tags::MD_UPDATE_ACTION,
    tags::MD_ENTRY_TYPE,
    tags::SYMBOL,
    tags::MD_ENTRY_PX,
    tags::MD_ENTRY_SIZE,
    tags::MD_ENTRY_TIME,
    tags::MD_PRICE_LEVEL,
    tags::AGGRESSOR_SIDE,
];

/// A trade print from a market data entry with type 2.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePrint {
    pub symbol: String,
    pub price: Price,
    pub size: Size,
    pub aggressor: Option<OrderSide>,
    pub timestamp: DateTime<Utc>,
}

/// Demultiplexed market data.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketDataEvent {
    /// Full book replace for a symbol (35=W).
    Replace {
        symbol: String,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ms: i64,
    },
    /// Ordered incremental deltas (35=X).
    Deltas {
        symbol: String,
        deltas: Vec<Delta>,
        timestamp_ms: i64,
    },
    /// Trade prints carried by either message type.
    Trade(TradePrint),
    /// Subscription rejected (35=Y); the registry entry must be removed.
    SubscriptionRejected {
        md_req_id: String,
        reason: String,
    },
}

/// Demultiplex one application-level FIX message into market data events.
///
/// Non-market-data message types return `NotMarketData` so the caller can
/// route them elsewhere.
pub fn demux_message(msg: &FixMessage) -> FeedResult<Vec<MarketDataEvent>> {
    match msg.msg_type()? {
        MsgType::MarketDataSnapshot => parse_snapshot(msg),
        MsgType::MarketDataIncremental => parse_incremental(msg),
        MsgType::MarketDataRequestReject => parse_reject(msg),
        other => Err(FeedError::NotMarketData(other.as_str().to_string())),
    }
}

fn parse_snapshot(msg: &FixMessage) -> FeedResult<Vec<MarketDataEvent>> {
    let symbol = msg.require(tags::SYMBOL)?.to_string();
    let entries = msg.groups(tags::NO_MD_ENTRIES, tags::MD_ENTRY_TYPE, MD_ENTRY_MEMBERS);

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    let mut events = Vec::new();

    for entry in &entries {
        let entry_type = entry
            .get(tags::MD_ENTRY_TYPE)
            .ok_or(FeedError::MissingEntryField(tags::MD_ENTRY_TYPE))?;
        match entry_type {
            "0" => bids.push(parse_level(entry)?),
            "1" => asks.push(parse_level(entry)?),
            "2" => events.push(MarketDataEvent::Trade(parse_trade(entry, &symbol)?)),
            other => {
                debug!(entry_type = other, "ignoring unknown MDEntryType");
            }
        }
    }

    events.insert(
        0,
        MarketDataEvent::Replace {
            symbol,
            bids,
            asks,
            timestamp_ms: Utc::now().timestamp_millis(),
        },
    );
    Ok(events)
}

fn parse_incremental(msg: &FixMessage) -> FeedResult<Vec<MarketDataEvent>> {
    let header_symbol = msg.get(tags::SYMBOL).unwrap_or_default().to_string();
    let entries = msg.groups(
        tags::NO_MD_ENTRIES,
        tags::MD_UPDATE_ACTION,
        MD_ENTRY_MEMBERS,
    );

    let mut deltas = Vec::new();
    let mut events = Vec::new();
    let mut symbol = header_symbol.clone();

    for entry in &entries {
        // Entries may carry their own symbol; the last one seen wins for
        // the aggregated delta event.
        if let Some(entry_symbol) = entry.get(tags::SYMBOL) {
            symbol = entry_symbol.to_string();
        }

        let action = entry
            .get(tags::MD_UPDATE_ACTION)
            .and_then(DeltaAction::from_fix)
            .ok_or(FeedError::MissingEntryField(tags::MD_UPDATE_ACTION))?;
        let entry_type = entry
            .get(tags::MD_ENTRY_TYPE)
            .ok_or(FeedError::MissingEntryField(tags::MD_ENTRY_TYPE))?;

        match entry_type {
            "0" | "1" => {
                let side = if entry_type == "0" {
                    BookSide::Bid
                } else {
                    BookSide::Ask
                };
                let price = parse_price(entry)?;
                // Deletes may omit the size.
                let size = match entry.get(tags::MD_ENTRY_SIZE) {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| FeedError::UnparseableEntry(raw.to_string()))?,
                    None => Size::ZERO,
                };
                deltas.push(Delta {
                    action,
                    side,
                    price,
                    size,
                });
            }
            "2" => events.push(MarketDataEvent::Trade(parse_trade(entry, &symbol)?)),
            other => {
                debug!(entry_type = other, "ignoring unknown MDEntryType");
            }
        }
    }

    if !deltas.is_empty() {
        events.insert(
            0,
            MarketDataEvent::Deltas {
                symbol,
                deltas,
                timestamp_ms: Utc::now().timestamp_millis(),
            },
        );
    }
    Ok(events)
}

fn parse_reject(msg: &FixMessage) -> FeedResult<Vec<MarketDataEvent>> {
    let md_req_id = msg.require(tags::MD_REQ_ID)?.to_string();
    let reason = msg
        .get(tags::TEXT)
        .unwrap_or("market data request rejected")
        .to_string();
    Ok(vec![MarketDataEvent::SubscriptionRejected {
        md_req_id,
        reason,
    }])
}

fn parse_level(entry: &GroupEntry) -> FeedResult<PriceLevel> {
    let price = parse_price(entry)?;
    let raw_size = entry
        .get(tags::MD_ENTRY_SIZE)
        .ok_or(FeedError::MissingEntryField(tags::MD_ENTRY_SIZE))?;
    let size = raw_size
        .parse()
        .map_err(|_| FeedError::UnparseableEntry(raw_size.to_string()))?;
    Ok(PriceLevel::new(price, size))
}

fn parse_price(entry: &GroupEntry) -> FeedResult<Price> {
    let raw = entry
        .get(tags::MD_ENTRY_PX)
        .ok_or(FeedError::MissingEntryField(tags::MD_ENTRY_PX))?;
    raw.parse()
        .map_err(|_| FeedError::UnparseableEntry(raw.to_string()))
}

fn parse_trade(entry: &GroupEntry, symbol: &str) -> FeedResult<TradePrint> {
    let price = parse_price(entry)?;
    let raw_size = entry
        .get(tags::MD_ENTRY_SIZE)
        .ok_or(FeedError::MissingEntryField(tags::MD_ENTRY_SIZE))?;
    let size = raw_size
        .parse()
        .map_err(|_| FeedError::UnparseableEntry(raw_size.to_string()))?;
    let aggressor = entry
        .get(tags::AGGRESSOR_SIDE)
        .and_then(OrderSide::from_fix);
    Ok(TradePrint {
        symbol: symbol.to_string(),
        price,
        size,
        aggressor,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use truex_fix::{decode, FrameBuilder};

    fn snapshot_msg() -> FixMessage {
        let frame = FrameBuilder::new(MsgType::MarketDataSnapshot)
            .header("TRUEX_UAT_OE", "CLI", 5, "20251006-14:30:00.000")
            .field(tags::MD_REQ_ID, "MDR-1")
            .field(tags::SYMBOL, "BTC-PYUSD")
            .field(tags::NO_MD_ENTRIES, "3")
            .field(tags::MD_ENTRY_TYPE, "0")
            .field(tags::MD_ENTRY_PX, "100")
            .field(tags::MD_ENTRY_SIZE, "1")
            .field(tags::MD_ENTRY_TYPE, "1")
            .field(tags::MD_ENTRY_PX, "101")
            .field(tags::MD_ENTRY_SIZE, "2")
            .field(tags::MD_ENTRY_TYPE, "2")
            .field(tags::MD_ENTRY_PX, "100.5")
            .field(tags::MD_ENTRY_SIZE, "0.25")
            .field(tags::AGGRESSOR_SIDE, "1")
            .build();
        decode(&frame).unwrap()
    }

    #[test]
    fn test_snapshot_demux() {
        let events = demux_message(&snapshot_msg()).unwrap();
        assert_eq!(events.len(), 2);

        match &events[0] {
            MarketDataEvent::Replace {
                symbol,
                bids,
                asks,
                ..
            } => {
                assert_eq!(symbol, "BTC-PYUSD");
                assert_eq!(bids.len(), 1);
                assert_eq!(bids[0].price.inner(), dec!(100));
                assert_eq!(asks.len(), 1);
                assert_eq!(asks[0].price.inner(), dec!(101));
            }
            other => panic!("expected Replace, got {other:?}"),
        }

        match &events[1] {
            MarketDataEvent::Trade(trade) => {
                assert_eq!(trade.price.inner(), dec!(100.5));
                assert_eq!(trade.aggressor, Some(OrderSide::Buy));
            }
            other => panic!("expected Trade, got {other:?}"),
        }
    }

    #[test]
    fn test_incremental_demux_ordered() {
        let frame = FrameBuilder::new(MsgType::MarketDataIncremental)
            .header("TRUEX_UAT_OE", "CLI", 6, "20251006-14:30:01.000")
            .field(tags::NO_MD_ENTRIES, "2")
            .field(tags::MD_UPDATE_ACTION, "0")
            .field(tags::MD_ENTRY_TYPE, "0")
            .field(tags::SYMBOL, "BTC-PYUSD")
            .field(tags::MD_ENTRY_PX, "99.5")
            .field(tags::MD_ENTRY_SIZE, "3")
            .field(tags::MD_UPDATE_ACTION, "2")
            .field(tags::MD_ENTRY_TYPE, "1")
            .field(tags::SYMBOL, "BTC-PYUSD")
            .field(tags::MD_ENTRY_PX, "101")
            .build();
        let msg = decode(&frame).unwrap();

        let events = demux_message(&msg).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MarketDataEvent::Deltas { symbol, deltas, .. } => {
                assert_eq!(symbol, "BTC-PYUSD");
                assert_eq!(deltas.len(), 2);
                assert_eq!(deltas[0].action, DeltaAction::New);
                assert_eq!(deltas[0].side, BookSide::Bid);
                assert_eq!(deltas[0].price.inner(), dec!(99.5));
                assert_eq!(deltas[1].action, DeltaAction::Delete);
                assert_eq!(deltas[1].side, BookSide::Ask);
                assert_eq!(deltas[1].size, Size::ZERO);
            }
            other => panic!("expected Deltas, got {other:?}"),
        }
    }

    #[test]
    fn test_reject_demux() {
        let frame = FrameBuilder::new(MsgType::MarketDataRequestReject)
            .header("TRUEX_UAT_OE", "CLI", 7, "20251006-14:30:02.000")
            .field(tags::MD_REQ_ID, "MDR-1")
            .field(tags::TEXT, "Unknown symbol")
            .build();
        let msg = decode(&frame).unwrap();

        let events = demux_message(&msg).unwrap();
        match &events[0] {
            MarketDataEvent::SubscriptionRejected { md_req_id, reason } => {
                assert_eq!(md_req_id, "MDR-1");
                assert_eq!(reason, "Unknown symbol");
            }
            other => panic!("expected SubscriptionRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_non_market_data_rejected() {
        let frame = FrameBuilder::new(MsgType::Heartbeat)
            .header("TRUEX_UAT_OE", "CLI", 8, "20251006-14:30:03.000")
            .build();
        let msg = decode(&frame).unwrap();

        assert!(matches!(
            demux_message(&msg),
            Err(FeedError::NotMarketData(_))
        ));
    }
}
