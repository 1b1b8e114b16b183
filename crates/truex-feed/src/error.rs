//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Not a market data message: 35={0}")]
    NotMarketData(String),

    #[error("Market data entry missing tag {0}")]
    MissingEntryField(u32),

    #[error("Unparseable entry value: {0}")]
    UnparseableEntry(String),

    #[error("FIX error: {0}")]
    Fix(#[from] truex_fix::FixError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed channel closed")]
    ChannelClosed,
}

pub type FeedResult<T> = Result<T, FeedError>;
