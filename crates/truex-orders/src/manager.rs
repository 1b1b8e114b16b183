//! Order manager.
//!
//! Owns the primary order index (`client_order_id -> Order`); the exchange
//! id lookup is derived from it, never persisted separately. Operations are
//! serialized per session by the caller; the index itself is sharded so
//! rapid-fire rejects never degrade throughput.

use crate::error::{OrderError, OrderResult};
use crate::report::ExecReport;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use truex_core::{
    ClientOrderId, EngineEvent, Fill, Order, OrderKind, OrderSide, OrderStatus, Price, Size,
    TimeInForce,
};
use truex_fix::{tags, MsgType};

/// Order manager configuration.
#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    /// PartyID (tag 448) stamped on every order.
    pub client_party_id: String,
    /// ExecInst (tag 18). Defaults to 6: add liquidity only.
    pub exec_inst: String,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            client_party_id: String::new(),
            exec_inst: "6".to_string(),
        }
    }
}

/// An application message ready for the session layer: message type plus
/// body fields in canonical order. Header and trailer are the session's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundOrder {
    pub msg_type: MsgType,
    pub body: Vec<(u32, String)>,
}

/// Order lifecycle manager.
pub struct OrderManager {
    config: OrderManagerConfig,
    orders: DashMap<String, Order>,
}

impl OrderManager {
    pub fn new(config: OrderManagerConfig) -> Self {
        Self {
            config,
            orders: DashMap::new(),
        }
    }

    /// Number of actively tracked orders.
    pub fn active_count(&self) -> usize {
        self.orders.len()
    }

    /// Snapshot of one order.
    pub fn get(&self, client_order_id: &ClientOrderId) -> Option<Order> {
        self.orders
            .get(client_order_id.as_str())
            .map(|entry| entry.clone())
    }

    /// Reverse lookup by exchange order id, derived from the primary index.
    pub fn find_by_exchange_id(&self, exchange_order_id: &str) -> Option<Order> {
        self.orders.iter().find_map(|entry| {
            (entry.exchange_order_id.as_deref() == Some(exchange_order_id))
                .then(|| entry.clone())
        })
    }

    /// Snapshot of every active order.
    pub fn active_orders(&self) -> Vec<Order> {
        self.orders.iter().map(|entry| entry.clone()).collect()
    }

    /// Validate and register a new order, producing the 35=D body.
    ///
    /// Re-submitting an existing `client_order_id` is a no-op that returns
    /// the tracked order without an outbound message.
    pub fn place(
        &self,
        client_order_id: ClientOrderId,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Size,
        price: Option<Price>,
        tif: TimeInForce,
    ) -> OrderResult<(Order, Option<OutboundOrder>)> {
        if client_order_id.is_empty() {
            return Err(OrderError::Invalid("empty client_order_id".to_string()));
        }
        if !qty.is_positive() {
            return Err(OrderError::Invalid(format!("non-positive qty: {qty}")));
        }
        match (kind, price) {
            (OrderKind::Limit, None) => {
                return Err(OrderError::Invalid("limit order without price".to_string()))
            }
            (OrderKind::Market, Some(_)) => {
                return Err(OrderError::Invalid("market order with price".to_string()))
            }
            _ => {}
        }

        if let Some(existing) = self.orders.get(client_order_id.as_str()) {
            debug!(cloid = %client_order_id, "duplicate client_order_id; returning existing order");
            return Ok((existing.clone(), None));
        }

        let order = Order::new(
            client_order_id.clone(),
            symbol,
            side,
            kind,
            qty,
            price,
            tif,
        );

        // Distinct ids with identical significant fields are allowed (the
        // strategy may legitimately repeat itself) but worth a log line.
        let repeated = self.orders.iter().any(|entry| {
            entry.significant_fields() == order.significant_fields()
                && entry.client_order_id != order.client_order_id
        });
        if repeated {
            info!(
                cloid = %client_order_id,
                symbol,
                %side,
                qty = %qty,
                "order repeats significant fields of an active order"
            );
        }

        let outbound = self.new_order_body(&order);
        self.orders
            .insert(client_order_id.as_str().to_string(), order.clone());

        Ok((order, Some(outbound)))
    }

    /// Request cancellation via cancel-replace with quantity zero.
    ///
    /// Allocates a fresh `ClOrdID` for the request; the original order goes
    /// into the local cancel-requested sub-state until a confirming
    /// execution report arrives.
    pub fn cancel(&self, client_order_id: &ClientOrderId) -> OrderResult<OutboundOrder> {
        let mut entry = self
            .orders
            .get_mut(client_order_id.as_str())
            .ok_or_else(|| OrderError::UnknownOrder(client_order_id.to_string()))?;

        if !entry.status.is_active() {
            return Err(OrderError::Invalid(format!(
                "order {client_order_id} is terminal ({})",
                entry.status
            )));
        }
        if entry.cancel_requested {
            return Err(OrderError::CancelInFlight(client_order_id.to_string()));
        }

        entry.cancel_requested = true;
        entry.last_updated = Utc::now();

        let replace_id = ClientOrderId::new();
        let outbound = self.cancel_body(&entry, &replace_id);
        debug!(orig = %client_order_id, replace = %replace_id, "cancel requested");
        Ok(outbound)
    }

    /// Apply an execution report, returning the events to surface.
    pub fn apply_report(&self, report: &ExecReport) -> OrderResult<Vec<EngineEvent>> {
        let key = self
            .resolve_key(report)
            .ok_or_else(|| OrderError::UnknownOrder(report.client_order_id.to_string()))?;

        if report.is_reject() {
            return Ok(self.apply_reject(&key, report));
        }

        let mut events = Vec::new();
        let mut remove_after = false;

        {
            let mut entry = self
                .orders
                .get_mut(&key)
                .ok_or_else(|| OrderError::UnknownOrder(key.clone()))?;
            let previous_status = entry.status;

            if entry.exchange_order_id.is_none() {
                if let Some(exchange_id) = &report.exchange_order_id {
                    entry.exchange_order_id = Some(exchange_id.clone());
                }
            }

            if let Some(status) = report.status {
                entry.status = status;
            }
            if let Some(cum_qty) = report.cum_qty {
                entry.cum_qty = cum_qty;
            }
            if let Some(avg_px) = report.avg_px {
                entry.avg_px = avg_px;
            }
            entry.leaves_qty = match report.leaves_qty {
                Some(leaves) => leaves,
                None => entry.qty - entry.cum_qty,
            };
            if entry.status == OrderStatus::Cancelled {
                entry.leaves_qty = Size::ZERO;
                entry.cancel_requested = false;
            }
            entry.last_updated = Utc::now();

            if previous_status == OrderStatus::PendingNew && entry.status == OrderStatus::New {
                events.push(EngineEvent::OrderAck {
                    order: Box::new(entry.clone()),
                });
            }

            if report.has_fill() {
                let fill = Fill {
                    fill_id: report
                        .exec_id
                        .clone()
                        .unwrap_or_else(|| format!("{}-{}", entry.client_order_id, entry.cum_qty)),
                    order_id: entry.client_order_id.clone(),
                    side: entry.side,
                    price: report.last_px.unwrap_or(entry.avg_px),
                    size: report.last_qty.unwrap_or(Size::ZERO),
                    fee: None,
                    timestamp: Utc::now(),
                    exchange_id: entry.exchange_order_id.clone(),
                };
                events.push(EngineEvent::OrderFilled {
                    order: Box::new(entry.clone()),
                    fill,
                });
            }

            if entry.status.is_terminal() {
                remove_after = true;
            }
        }

        if remove_after {
            self.orders.remove(&key);
        }

        Ok(events)
    }

    /// Reject classification. Text containing "invalid client" is a fatal
    /// configuration error; everything else is a normal business reject.
    fn apply_reject(&self, key: &str, report: &ExecReport) -> Vec<EngineEvent> {
        let reason = report
            .text
            .clone()
            .or_else(|| report.ord_rej_reason.clone())
            .unwrap_or_else(|| "order rejected".to_string());

        let removed = self.orders.remove(key).map(|(_, order)| order);
        let Some(mut order) = removed else {
            return Vec::new();
        };
        order.status = OrderStatus::Rejected;
        order.reject_reason = Some(reason.clone());
        order.last_updated = Utc::now();

        if reason.to_lowercase().contains("invalid client") {
            warn!(cloid = %order.client_order_id, %reason, "fatal auth reject");
            vec![EngineEvent::FatalAuthError { reason }]
        } else {
            debug!(cloid = %order.client_order_id, %reason, "order rejected");
            vec![EngineEvent::OrderRejected {
                order: Box::new(order),
                reason,
            }]
        }
    }

    /// Resolve the tracked order a report refers to: tag 11 first, then
    /// tag 41 for cancel-replace confirmations carrying the replacement id.
    fn resolve_key(&self, report: &ExecReport) -> Option<String> {
        if self.orders.contains_key(report.client_order_id.as_str()) {
            return Some(report.client_order_id.as_str().to_string());
        }
        report
            .orig_client_order_id
            .as_ref()
            .filter(|orig| self.orders.contains_key(orig.as_str()))
            .map(|orig| orig.as_str().to_string())
    }

    /// 35=D body in canonical order:
    /// `11, 18, 55, 54, 38, 40, 44, 59, 453, 448, 452`.
    fn new_order_body(&self, order: &Order) -> OutboundOrder {
        let mut body = vec![
            (tags::CL_ORD_ID, order.client_order_id.to_string()),
            (tags::EXEC_INST, self.config.exec_inst.clone()),
            (tags::SYMBOL, order.symbol.clone()),
            (tags::SIDE, order.side.to_fix().to_string()),
            (tags::ORDER_QTY, order.qty.to_string()),
            (tags::ORD_TYPE, order.kind.to_fix().to_string()),
        ];
        if let Some(price) = order.price {
            body.push((tags::PRICE, price.to_string()));
        }
        body.push((tags::TIME_IN_FORCE, order.tif.to_fix().to_string()));
        body.extend(self.party_triple());
        OutboundOrder {
            msg_type: MsgType::NewOrderSingle,
            body,
        }
    }

    /// 35=G body: the replacement id, the original id, and quantity zero.
    fn cancel_body(&self, order: &Order, replace_id: &ClientOrderId) -> OutboundOrder {
        let mut body = vec![
            (tags::CL_ORD_ID, replace_id.to_string()),
            (tags::ORIG_CL_ORD_ID, order.client_order_id.to_string()),
            (tags::EXEC_INST, self.config.exec_inst.clone()),
            (tags::SYMBOL, order.symbol.clone()),
            (tags::SIDE, order.side.to_fix().to_string()),
            (tags::ORDER_QTY, "0".to_string()),
            (tags::ORD_TYPE, order.kind.to_fix().to_string()),
        ];
        if let Some(price) = order.price {
            body.push((tags::PRICE, price.to_string()));
        }
        body.push((tags::TIME_IN_FORCE, order.tif.to_fix().to_string()));
        body.extend(self.party_triple());
        OutboundOrder {
            msg_type: MsgType::OrderCancelReplaceRequest,
            body,
        }
    }

    /// The `453 -> 448 -> 452` triple, in that exact order. Reordering is
    /// rejected by the exchange.
    fn party_triple(&self) -> Vec<(u32, String)> {
        vec![
            (tags::NO_PARTY_IDS, "1".to_string()),
            (tags::PARTY_ID, self.config.client_party_id.clone()),
            (tags::PARTY_ROLE, "3".to_string()),
        ]
    }
}
