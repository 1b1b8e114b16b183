//! Order lifecycle domain types.
//!
//! An [`Order`] lives from local creation until a terminal execution report
//! and survives disconnects. The exchange-assigned order id is recorded when
//! the first execution report referencing the client order id arrives.

use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// FIX tag 54 value.
    pub fn to_fix(&self) -> &'static str {
        match self {
            Self::Buy => "1",
            Self::Sell => "2",
        }
    }

    /// Parse a FIX tag 54 value.
    pub fn from_fix(v: &str) -> Option<Self> {
        match v {
            "1" => Some(Self::Buy),
            "2" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    /// FIX tag 40 value.
    pub fn to_fix(&self) -> &'static str {
        match self {
            Self::Market => "1",
            Self::Limit => "2",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled (our primary TIF for resting quotes).
    #[default]
    #[serde(rename = "Gtc")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "Ioc")]
    ImmediateOrCancel,
    /// Fill-or-kill.
    #[serde(rename = "Fok")]
    FillOrKill,
}

impl TimeInForce {
    /// FIX tag 59 value.
    pub fn to_fix(&self) -> &'static str {
        match self {
            Self::GoodTilCancelled => "1",
            Self::ImmediateOrCancel => "3",
            Self::FillOrKill => "4",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "Gtc"),
            Self::ImmediateOrCancel => write!(f, "Ioc"),
            Self::FillOrKill => write!(f, "Fok"),
        }
    }
}

/// Order status through its lifecycle.
///
/// Maps one-to-one onto execution report OrdStatus (tag 39) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order created locally, not yet acknowledged.
    #[default]
    PendingNew,
    /// Acknowledged and resting.
    New,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled on the exchange.
    Cancelled,
    /// Rejected by the exchange.
    Rejected,
    /// Expired (e.g. IOC remainder).
    Expired,
}

impl OrderStatus {
    /// Map an execution report OrdStatus (tag 39) value.
    pub fn from_ord_status(v: &str) -> Option<Self> {
        match v {
            "0" => Some(Self::New),
            "1" => Some(Self::PartiallyFilled),
            "2" => Some(Self::Filled),
            "4" => Some(Self::Cancelled),
            "8" => Some(Self::Rejected),
            "A" => Some(Self::PendingNew),
            "C" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Returns true if no further execution reports are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is still working on the exchange.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingNew => "pending_new",
            Self::New => "new",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Client order ID for idempotency.
///
/// Every order must have a unique id so retries never double-submit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `tx_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("tx_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self::from_string(s.to_string())
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A tracked order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Client-assigned order id (tag 11).
    pub client_order_id: ClientOrderId,
    /// Exchange-assigned order id (tag 37), set on first execution report.
    pub exchange_order_id: Option<String>,
    /// Instrument symbol.
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Original order quantity.
    pub qty: Size,
    /// Limit price; present iff `kind == Limit`.
    pub price: Option<Price>,
    pub tif: TimeInForce,
    pub status: OrderStatus,
    /// Set when a cancel-replace has been sent but not yet confirmed.
    pub cancel_requested: bool,
    /// Replacing order's parent, for cancel-replace chains.
    pub parent_order_id: Option<ClientOrderId>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Cumulative filled quantity (tag 14).
    pub cum_qty: Size,
    /// Average fill price (tag 6).
    pub avg_px: Price,
    /// Quantity still working (tag 151).
    pub leaves_qty: Size,
    /// Reject text (tag 58) when status is Rejected.
    pub reject_reason: Option<String>,
}

impl Order {
    /// Create a new order in `PendingNew` with full leaves quantity.
    pub fn new(
        client_order_id: ClientOrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        kind: OrderKind,
        qty: Size,
        price: Option<Price>,
        tif: TimeInForce,
    ) -> Self {
        let now = Utc::now();
        Self {
            client_order_id,
            exchange_order_id: None,
            symbol: symbol.into(),
            side,
            kind,
            qty,
            price,
            tif,
            status: OrderStatus::PendingNew,
            cancel_requested: false,
            parent_order_id: None,
            created_at: now,
            last_updated: now,
            cum_qty: Size::ZERO,
            avg_px: Price::ZERO,
            leaves_qty: qty,
            reject_reason: None,
        }
    }

    /// Remaining unfilled quantity.
    pub fn remaining(&self) -> Size {
        self.qty - self.cum_qty
    }

    /// Significant fields for duplicate detection: two distinct ids with
    /// the same tuple are permitted but logged.
    pub fn significant_fields(&self) -> (OrderSide, Option<Price>, Size, &str, OrderKind, OrderStatus, Option<&ClientOrderId>, Option<&str>) {
        (
            self.side,
            self.price,
            self.qty,
            self.symbol.as_str(),
            self.kind,
            self.status,
            self.parent_order_id.as_ref(),
            self.exchange_order_id.as_deref(),
        )
    }
}

/// A fill derived from an execution report with `last_qty > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Execution id (tag 17).
    pub fill_id: String,
    /// Client order id the fill belongs to.
    pub order_id: ClientOrderId,
    pub side: OrderSide,
    pub price: Price,
    pub size: Size,
    pub fee: Option<Price>,
    pub timestamp: DateTime<Utc>,
    /// Exchange-assigned order id.
    pub exchange_id: Option<String>,
}
