//! Order book error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookError {
    /// Payload shape matched none of the supported formats.
    #[error("Unknown payload format: {0}")]
    UnknownFormat(String),

    /// A price or size failed to parse as a decimal.
    #[error("Unparseable level: {0}")]
    UnparseableLevel(String),

    /// Update carried no levels on either side.
    #[error("Empty update for {symbol}")]
    EmptyUpdate { symbol: String },

    /// Best prices failed the finite-positive check.
    #[error("Invalid best prices for {symbol}: {reason}")]
    InvalidBest { symbol: String, reason: String },

    /// Inversion beyond tolerance; the previous book is retained.
    #[error("Severe inversion for {symbol}: bid {bid} over ask {ask} ({pct:.2}%)")]
    SevereInversion {
        symbol: String,
        bid: String,
        ask: String,
        pct: f64,
    },

    /// Book has never seen both sides; nothing publishable yet.
    #[error("Book for {symbol} is not yet two-sided")]
    NotTwoSided { symbol: String },

    /// Engine mailbox closed.
    #[error("Book engine unavailable: {0}")]
    EngineGone(String),
}

pub type BookResult<T> = Result<T, BookError>;
