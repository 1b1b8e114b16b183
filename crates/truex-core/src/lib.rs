//! Core domain types for the TrueX market-making data plane.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Order`, `Fill`, `OrderStatus`: Order lifecycle domain
//! - `PriceLevel`, `BookSnapshot`: Order book domain
//! - `EngineEvent`: Events surfaced to consumers
//! - `Credentials`: HMAC credentials (never logged in clear)

pub mod book;
pub mod credentials;
pub mod decimal;
pub mod error;
pub mod event;
pub mod order;

pub use book::{BookSide, BookSnapshot, BookSource, Delta, DeltaAction, PriceLevel};
pub use credentials::Credentials;
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use event::EngineEvent;
pub use order::{
    ClientOrderId, Fill, Order, OrderKind, OrderSide, OrderStatus, TimeInForce,
};
