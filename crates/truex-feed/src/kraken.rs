//! Kraken WebSocket ingress.
//!
//! Subscribes to the public book channel and forwards raw Kraken payloads
//! (`bs`/`as` snapshots, `b`/`a` updates) through the normalizer into the
//! book engine's update channel. Connection lifecycle follows the same
//! reconnect-with-backoff shape as the FIX transport.

use crate::error::FeedResult;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use truex_book::{normalize_payload, NormalizedUpdate};
use truex_core::BookSource;

/// Kraken feed configuration.
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    /// WebSocket URL.
    pub url: String,
    /// Pairs to subscribe to (e.g. "XBT/USD").
    pub pairs: Vec<String>,
    /// Book depth to request.
    pub depth: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_cap_ms: u64,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.kraken.com".to_string(),
            pairs: Vec::new(),
            depth: 10,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 30000,
        }
    }
}

/// Kraken WebSocket feed task.
pub struct KrakenFeed {
    config: KrakenConfig,
    update_tx: mpsc::Sender<NormalizedUpdate>,
    cancel: CancellationToken,
}

impl KrakenFeed {
    pub fn new(
        config: KrakenConfig,
        update_tx: mpsc::Sender<NormalizedUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            update_tx,
            cancel,
        }
    }

    /// Run the feed until cancelled. Reconnects forever with backoff; the
    /// book engine tolerates replays because snapshots are idempotent.
    pub async fn run(self) {
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                info!("kraken feed cancelled");
                return;
            }

            match self.connect_once().await {
                Ok(()) => {
                    info!("kraken connection closed");
                    attempt = 0;
                }
                Err(e) => {
                    error!(?e, "kraken connection error");
                    attempt = attempt.saturating_add(1);
                }
            }

            let delay = backoff_delay(
                self.config.reconnect_base_ms,
                self.config.reconnect_cap_ms,
                attempt.max(1),
            );
            warn!(attempt, delay_ms = delay.as_millis(), "kraken reconnecting");

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_once(&self) -> FeedResult<()> {
        info!(url = %self.config.url, "connecting to kraken");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Subscribe to the book channel for every configured pair.
        let subscribe = serde_json::json!({
            "event": "subscribe",
            "pair": self.config.pairs,
            "subscription": {"name": "book", "depth": self.config.depth}
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!(pairs = ?self.config.pairs, depth = self.config.depth, "kraken subscribed");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(&text).await {
                                warn!(?e, "dropping kraken message");
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(?frame, "kraken closed the connection");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) -> FeedResult<()> {
        let value: Value = serde_json::from_str(text)?;

        match &value {
            // Status events: heartbeat, systemStatus, subscriptionStatus.
            Value::Object(obj) => {
                if let Some(event) = obj.get("event").and_then(Value::as_str) {
                    debug!(event, "kraken event");
                }
                Ok(())
            }
            // Book data: [channel_id, payload..., channel_name, pair].
            Value::Array(items) if items.len() >= 4 => {
                let pair = match items.last().and_then(Value::as_str) {
                    Some(p) => p,
                    None => {
                        debug!("kraken array message without pair; skipping");
                        return Ok(());
                    }
                };

                // An update may split bid and ask payloads into separate
                // objects; merge them before normalizing.
                let mut merged = serde_json::Map::new();
                for item in &items[1..items.len() - 2] {
                    if let Value::Object(obj) = item {
                        for (k, v) in obj {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                }

                match normalize_payload(pair, BookSource::KrakenWs, &Value::Object(merged)) {
                    Ok(update) => {
                        if self.update_tx.send(update).await.is_err() {
                            warn!("book update receiver dropped");
                        }
                    }
                    Err(e) => {
                        warn!(pair, %e, "unknown kraken payload shape; dropped");
                    }
                }
                Ok(())
            }
            _ => {
                debug!("unrecognized kraken message; skipping");
                Ok(())
            }
        }
    }
}

/// Exponential backoff: base * 2^(attempt-1), capped.
fn backoff_delay(base_ms: u64, cap_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);
    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        assert_eq!(backoff_delay(1000, 30000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 30000, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 30000, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(1000, 30000, 6), Duration::from_millis(30000));
        assert_eq!(backoff_delay(1000, 30000, 20), Duration::from_millis(30000));
    }

    #[tokio::test]
    async fn test_handle_text_book_update() {
        let (tx, mut rx) = mpsc::channel(8);
        let feed = KrakenFeed::new(KrakenConfig::default(), tx, CancellationToken::new());

        let snapshot = r#"[560, {"as": [["30001.0", "1.0", "1700000000.0"]], "bs": [["30000.0", "2.0", "1700000000.0"]]}, "book-10", "XBT/USD"]"#;
        feed.handle_text(snapshot).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.symbol, "XBT/USD");
        assert!(update.is_full());
    }

    #[tokio::test]
    async fn test_handle_text_split_update() {
        let (tx, mut rx) = mpsc::channel(8);
        let feed = KrakenFeed::new(KrakenConfig::default(), tx, CancellationToken::new());

        let update = r#"[560, {"a": [["30002.0", "0.5", "1700000001.0"]]}, {"b": [["29999.0", "1.5", "1700000001.0"]]}, "book-10", "XBT/USD"]"#;
        feed.handle_text(update).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(update.bids.is_some());
        assert!(update.asks.is_some());
    }

    #[tokio::test]
    async fn test_handle_text_event_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        let feed = KrakenFeed::new(KrakenConfig::default(), tx, CancellationToken::new());

        feed.handle_text(r#"{"event": "heartbeat"}"#).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
