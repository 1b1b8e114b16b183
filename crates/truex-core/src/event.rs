//! Events surfaced to consumers.
//!
//! All business-level outcomes flow through [`EngineEvent`]; transport and
//! framing failures are handled inside their owning tasks and never appear
//! here.

use crate::book::BookSnapshot;
use crate::order::{Fill, Order, OrderSide};
use crate::{Price, Size};
use serde::{Deserialize, Serialize};

/// Event delivered to engine consumers (strategies, bridges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Session logged in and ready.
    Connected,
    /// Session lost; reconnection may follow.
    Disconnected { reason: String },
    /// Authentication rejected by the exchange. Not retried.
    FatalAuthError { reason: String },
    /// Validated book snapshot published.
    BookSnapshot {
        symbol: String,
        snapshot: Box<BookSnapshot>,
    },
    /// Trade print from market data.
    Trade {
        symbol: String,
        price: Price,
        size: Size,
        side: Option<OrderSide>,
    },
    /// Order acknowledged by the exchange.
    OrderAck { order: Box<Order> },
    /// Order rejected; removed from active tracking.
    OrderRejected { order: Box<Order>, reason: String },
    /// Order (partially) filled.
    OrderFilled { order: Box<Order>, fill: Fill },
    /// Market data subscription rejected; subscription dropped.
    SubscriptionRejected { symbol: String, reason: String },
}

impl EngineEvent {
    /// Short label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::FatalAuthError { .. } => "fatal_auth_error",
            Self::BookSnapshot { .. } => "book_snapshot",
            Self::Trade { .. } => "trade",
            Self::OrderAck { .. } => "order_ack",
            Self::OrderRejected { .. } => "order_rejected",
            Self::OrderFilled { .. } => "order_filled",
            Self::SubscriptionRejected { .. } => "subscription_rejected",
        }
    }

    /// True for events that should stop the supervisor.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAuthError { .. })
    }
}
