//! Subscriber fan-out.
//!
//! Subscribers register callbacks by handle and receive a deep copy of each
//! published snapshot in registration order. A panicking subscriber is
//! caught and logged; delivery to the remaining subscribers continues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;
use truex_core::BookSnapshot;

/// Subscriber callback. Runs synchronously in the book task; long-running
/// work must be handed off by the subscriber itself.
pub type SubscriberFn = Box<dyn FnMut(BookSnapshot) + Send>;

/// Opaque unsubscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Ordered subscriber registry for one book.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_handle: u64,
    subscribers: Vec<(u64, SubscriberFn)>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Register a subscriber; it will receive every snapshot published
    /// after this call, in registration order relative to its peers.
    pub fn subscribe(&mut self, callback: SubscriberFn) -> Subscription {
        self.next_handle += 1;
        let handle = self.next_handle;
        self.subscribers.push((handle, callback));
        Subscription(handle)
    }

    /// Remove a subscriber. Returns false when the handle is unknown.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(h, _)| *h != subscription.0);
        self.subscribers.len() != before
    }

    /// Deliver a snapshot to every subscriber.
    ///
    /// Each subscriber gets its own clone, so callback-side mutation can
    /// never corrupt the book or leak into other subscribers.
    pub fn publish(&mut self, snapshot: &BookSnapshot) {
        for (handle, callback) in &mut self.subscribers {
            let copy = snapshot.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(copy))).is_err() {
                warn!(
                    symbol = %snapshot.symbol,
                    handle,
                    "subscriber panicked during delivery; continuing"
                );
            }
        }
    }

    /// Deliver a snapshot to a single subscriber (used to hand the current
    /// book to a newly registered subscriber).
    pub fn deliver_to(&mut self, subscription: Subscription, snapshot: &BookSnapshot) {
        if let Some((handle, callback)) = self
            .subscribers
            .iter_mut()
            .find(|(h, _)| *h == subscription.0)
        {
            let copy = snapshot.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(copy))).is_err() {
                warn!(
                    symbol = %snapshot.symbol,
                    handle,
                    "subscriber panicked on initial delivery"
                );
            }
        }
    }
}
