//! Market data subscription registry.
//!
//! A subscription is created when the request goes out, deleted when the
//! exchange rejects it (35=Y), and re-sent with a fresh `MDReqID` after
//! every reconnect.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use truex_fix::tags;
use uuid::Uuid;

/// Snapshot-plus-updates subscription request type (tag 263).
const SUBSCRIBE_SNAPSHOT_UPDATES: &str = "1";

/// An active market data subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// MDReqID (tag 262) of the outstanding request.
    pub md_req_id: String,
    pub symbol: String,
    /// Requested depth (tag 264); 0 means full book.
    pub requested_depth: u32,
    /// Tag 263 value sent with the request.
    pub subscription_type: String,
    pub started_at: DateTime<Utc>,
}

impl Subscription {
    fn new(symbol: impl Into<String>, requested_depth: u32) -> Self {
        Self {
            md_req_id: fresh_md_req_id(),
            symbol: symbol.into(),
            requested_depth,
            subscription_type: SUBSCRIBE_SNAPSHOT_UPDATES.to_string(),
            started_at: Utc::now(),
        }
    }

    /// 35=V body for this subscription:
    /// `262, 263, 264, 267, 269*, 146, 55`.
    pub fn request_body(&self) -> Vec<(u32, String)> {
        vec![
            (tags::MD_REQ_ID, self.md_req_id.clone()),
            (
                tags::SUBSCRIPTION_REQUEST_TYPE,
                self.subscription_type.clone(),
            ),
            (tags::MARKET_DEPTH, self.requested_depth.to_string()),
            (tags::NO_MD_ENTRY_TYPES, "3".to_string()),
            (tags::MD_ENTRY_TYPE, "0".to_string()),
            (tags::MD_ENTRY_TYPE, "1".to_string()),
            (tags::MD_ENTRY_TYPE, "2".to_string()),
            (tags::NO_RELATED_SYM, "1".to_string()),
            (tags::SYMBOL, self.symbol.clone()),
        ]
    }
}

fn fresh_md_req_id() -> String {
    format!("MDR-{}", &Uuid::new_v4().to_string()[..8])
}

/// Registry of active subscriptions keyed by MDReqID.
#[derive(Default)]
pub struct SubscriptionManager {
    subs: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }

    /// Create and register a subscription for a symbol.
    ///
    /// A symbol that is already subscribed keeps its existing entry.
    pub fn add(&self, symbol: &str, requested_depth: u32) -> Subscription {
        let mut subs = self.subs.write();
        if let Some(existing) = subs.values().find(|s| s.symbol == symbol) {
            debug!(symbol, md_req_id = %existing.md_req_id, "symbol already subscribed");
            return existing.clone();
        }
        let sub = Subscription::new(symbol, requested_depth);
        subs.insert(sub.md_req_id.clone(), sub.clone());
        sub
    }

    /// Delete a subscription after a 35=Y reject.
    pub fn remove_by_req_id(&self, md_req_id: &str) -> Option<Subscription> {
        self.subs.write().remove(md_req_id)
    }

    /// All active subscriptions.
    pub fn active(&self) -> Vec<Subscription> {
        self.subs.read().values().cloned().collect()
    }

    /// Rotate every subscription to a fresh MDReqID for re-sending after a
    /// reconnect. Returns the new subscriptions in no particular order.
    pub fn rehydrate(&self) -> Vec<Subscription> {
        let mut subs = self.subs.write();
        let rotated: Vec<Subscription> = subs
            .values()
            .map(|old| Subscription {
                md_req_id: fresh_md_req_id(),
                symbol: old.symbol.clone(),
                requested_depth: old.requested_depth,
                subscription_type: old.subscription_type.clone(),
                started_at: Utc::now(),
            })
            .collect();
        subs.clear();
        for sub in &rotated {
            subs.insert(sub.md_req_id.clone(), sub.clone());
        }
        rotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mgr = SubscriptionManager::new();
        let sub = mgr.add("BTC-PYUSD", 10);
        assert_eq!(mgr.len(), 1);
        assert!(sub.md_req_id.starts_with("MDR-"));

        let removed = mgr.remove_by_req_id(&sub.md_req_id).unwrap();
        assert_eq!(removed.symbol, "BTC-PYUSD");
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_add_same_symbol_is_idempotent() {
        let mgr = SubscriptionManager::new();
        let first = mgr.add("BTC-PYUSD", 10);
        let second = mgr.add("BTC-PYUSD", 10);
        assert_eq!(first.md_req_id, second.md_req_id);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_rehydrate_rotates_req_ids() {
        let mgr = SubscriptionManager::new();
        let original = mgr.add("BTC-PYUSD", 10);
        mgr.add("ETH-PYUSD", 10);

        let rotated = mgr.rehydrate();
        assert_eq!(rotated.len(), 2);
        assert_eq!(mgr.len(), 2);

        let symbols: Vec<&str> = rotated.iter().map(|s| s.symbol.as_str()).collect();
        assert!(symbols.contains(&"BTC-PYUSD"));
        assert!(symbols.contains(&"ETH-PYUSD"));
        for sub in &rotated {
            assert_ne!(sub.md_req_id, original.md_req_id);
        }
    }

    #[test]
    fn test_request_body_field_order() {
        let mgr = SubscriptionManager::new();
        let sub = mgr.add("BTC-PYUSD", 10);

        let body = sub.request_body();
        let order: Vec<u32> = body.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, vec![262, 263, 264, 267, 269, 269, 269, 146, 55]);
        assert_eq!(body.last().unwrap().1, "BTC-PYUSD");
    }
}
