//! Market data demultiplexing.
//!
//! Turns FIX market-data messages (35=W snapshots, 35=X incrementals,
//! 35=Y rejects) into book events, and runs the Kraken WebSocket ingress
//! that feeds normalized payloads into the same book engine.

pub mod demux;
pub mod error;
pub mod kraken;

pub use demux::{demux_message, MarketDataEvent, TradePrint};
pub use error::{FeedError, FeedResult};
pub use kraken::{KrakenConfig, KrakenFeed};
