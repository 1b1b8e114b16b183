//! Book engine task.
//!
//! One task per symbol owns the [`BookState`] and the subscriber registry.
//! All interaction goes through the mailbox: updates, deltas, subscription
//! management, and snapshot reads. Subscriber callbacks execute inside this
//! task right after validation.

use crate::book::{BookConfig, BookState};
use crate::error::{BookError, BookResult};
use crate::normalize::NormalizedUpdate;
use crate::publisher::{SubscriberFn, SubscriberRegistry, Subscription};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use truex_core::{BookSnapshot, BookSource, Delta};

const MAILBOX_DEPTH: usize = 256;

/// Commands accepted by a book engine task.
pub enum BookCommand {
    /// Apply a normalized (possibly one-sided) update.
    Update(NormalizedUpdate),
    /// Apply incremental deltas in order.
    Deltas {
        deltas: Vec<Delta>,
        source: BookSource,
        timestamp_ms: i64,
    },
    /// Register a subscriber; replies with its handle after the current
    /// snapshot (if any) has been delivered to it.
    Subscribe {
        callback: SubscriberFn,
        reply: oneshot::Sender<Subscription>,
    },
    /// Remove a subscriber by handle.
    Unsubscribe(Subscription),
    /// Read the latest valid snapshot.
    Snapshot {
        reply: oneshot::Sender<Option<BookSnapshot>>,
    },
}

/// Handle for talking to a spawned book engine.
#[derive(Clone)]
pub struct BookHandle {
    symbol: String,
    tx: mpsc::Sender<BookCommand>,
}

impl BookHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Submit a normalized update.
    pub async fn update(&self, update: NormalizedUpdate) -> BookResult<()> {
        self.send(BookCommand::Update(update)).await
    }

    /// Submit incremental deltas.
    pub async fn apply_deltas(
        &self,
        deltas: Vec<Delta>,
        source: BookSource,
        timestamp_ms: i64,
    ) -> BookResult<()> {
        self.send(BookCommand::Deltas {
            deltas,
            source,
            timestamp_ms,
        })
        .await
    }

    /// Register a subscriber callback.
    pub async fn subscribe(&self, callback: SubscriberFn) -> BookResult<Subscription> {
        let (reply, rx) = oneshot::channel();
        self.send(BookCommand::Subscribe { callback, reply }).await?;
        rx.await
            .map_err(|_| BookError::EngineGone(self.symbol.clone()))
    }

    /// Remove a subscriber.
    pub async fn unsubscribe(&self, subscription: Subscription) -> BookResult<()> {
        self.send(BookCommand::Unsubscribe(subscription)).await
    }

    /// Latest valid snapshot, if the book has one.
    pub async fn snapshot(&self) -> BookResult<Option<BookSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(BookCommand::Snapshot { reply }).await?;
        rx.await
            .map_err(|_| BookError::EngineGone(self.symbol.clone()))
    }

    async fn send(&self, cmd: BookCommand) -> BookResult<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| BookError::EngineGone(self.symbol.clone()))
    }
}

/// Per-symbol book engine.
pub struct BookEngine {
    state: BookState,
    registry: SubscriberRegistry,
    rx: mpsc::Receiver<BookCommand>,
    cancel: CancellationToken,
}

impl BookEngine {
    /// Spawn an engine task for a symbol. The handle is cheap to clone.
    pub fn spawn(
        symbol: impl Into<String>,
        config: BookConfig,
        cancel: CancellationToken,
    ) -> (BookHandle, JoinHandle<()>) {
        let symbol = symbol.into();
        let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
        let engine = Self {
            state: BookState::new(symbol.clone(), config),
            registry: SubscriberRegistry::new(),
            rx,
            cancel,
        };
        let handle = BookHandle {
            symbol: symbol.clone(),
            tx,
        };
        let join = tokio::spawn(engine.run());
        info!(symbol = %symbol, "book engine started");
        (handle, join)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(symbol = %self.state.symbol(), "book engine cancelled");
                    break;
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => {
                            debug!(symbol = %self.state.symbol(), "book mailbox closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn handle(&mut self, cmd: BookCommand) {
        match cmd {
            BookCommand::Update(update) => {
                let result = self.state.apply(update);
                self.publish_or_log(result);
            }
            BookCommand::Deltas {
                deltas,
                source,
                timestamp_ms,
            } => {
                let result = self.state.apply_deltas(&deltas, source, timestamp_ms);
                self.publish_or_log(result);
            }
            BookCommand::Subscribe { callback, reply } => {
                let subscription = self.registry.subscribe(callback);
                if let Some(snapshot) = self.state.last_valid() {
                    let snapshot = snapshot.clone();
                    self.registry.deliver_to(subscription, &snapshot);
                }
                let _ = reply.send(subscription);
            }
            BookCommand::Unsubscribe(subscription) => {
                if !self.registry.unsubscribe(subscription) {
                    debug!(symbol = %self.state.symbol(), "unsubscribe for unknown handle");
                }
            }
            BookCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.last_valid().cloned());
            }
        }
    }

    fn publish_or_log(&mut self, result: BookResult<BookSnapshot>) {
        match result {
            Ok(snapshot) => self.registry.publish(&snapshot),
            Err(BookError::NotTwoSided { .. }) => {
                // Expected while the first side waits for its counterpart.
            }
            Err(err) => {
                warn!(symbol = %self.state.symbol(), %err, "book update dropped");
            }
        }
    }
}
