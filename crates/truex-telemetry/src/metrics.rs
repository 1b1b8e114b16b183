//! Prometheus metrics for the trading data plane.
//!
//! # Panics
//!
//! Registration failures (duplicate metric names) unwrap on purpose: a
//! misconfigured metric set should stop the process while the statics are
//! first touched, not surface as missing series later.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Gauge, IntCounter,
};

/// FIX session connection state (1 = logged in, 0 = down).
pub static SESSION_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "truex_session_connected",
        "FIX session state (1=logged in)"
    )
    .unwrap()
});

/// Total reconnection attempts, by reason.
pub static SESSION_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "truex_session_reconnect_total",
        "Total session reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Frames decoded from the wire.
pub static FRAMES_DECODED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "truex_frames_decoded_total",
        "Total FIX frames decoded successfully"
    )
    .unwrap()
});

/// Frames dropped for checksum or framing errors.
pub static FRAMES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "truex_frames_dropped_total",
        "Total FIX frames dropped as malformed"
    )
    .unwrap()
});

/// Book snapshots published, by symbol.
pub static BOOK_PUBLISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "truex_book_published_total",
        "Total validated book snapshots published",
        &["symbol"]
    )
    .unwrap()
});

/// Book updates dropped by validation, by reason.
pub static BOOK_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "truex_book_dropped_total",
        "Total book updates dropped by validation",
        &["reason"]
    )
    .unwrap()
});

/// Order rejects, by classification.
pub static ORDER_REJECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "truex_order_rejects_total",
        "Total order rejects",
        &["kind"]
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touch each static; duplicate registration would panic.
        SESSION_CONNECTED.set(0.0);
        SESSION_RECONNECT_TOTAL.with_label_values(&["test"]).inc();
        FRAMES_DECODED_TOTAL.inc();
        FRAMES_DROPPED_TOTAL.inc();
        BOOK_PUBLISHED_TOTAL.with_label_values(&["BTC-PYUSD"]).inc();
        BOOK_DROPPED_TOTAL.with_label_values(&["inversion"]).inc();
        ORDER_REJECTS_TOTAL.with_label_values(&["business"]).inc();
    }
}
