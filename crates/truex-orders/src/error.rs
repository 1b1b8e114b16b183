//! Order lifecycle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid order: {0}")]
    Invalid(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Order {0} already has a cancel in flight")]
    CancelInFlight(String),

    #[error("FIX error: {0}")]
    Fix(#[from] truex_fix::FixError),
}

pub type OrderResult<T> = Result<T, OrderError>;
