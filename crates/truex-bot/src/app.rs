//! Application orchestration.
//!
//! Wires the FIX session, per-symbol book engines, the order manager, and
//! the optional Kraken ingress together, then runs the supervisor loop.
//! Transport and framing problems stay inside their owning tasks; fatal
//! authentication errors stop the application.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use truex_book::{BookEngine, BookHandle, NormalizedUpdate};
use truex_core::{
    ClientOrderId, Credentials, EngineEvent, Order, OrderKind, OrderSide, Price, Size,
    TimeInForce,
};
use truex_feed::{demux_message, KrakenFeed, MarketDataEvent};
use truex_fix::{FixMessage, MsgType};
use truex_orders::{ExecReport, OrderManager, OrderManagerConfig};
use truex_session::{FixSession, SessionHandle, SessionResult};
use truex_telemetry::metrics;

const EVENT_CHANNEL_DEPTH: usize = 512;
const APP_CHANNEL_DEPTH: usize = 512;
const UPDATE_CHANNEL_DEPTH: usize = 512;

/// The assembled trading data plane.
pub struct Application {
    config: AppConfig,
    cancel: CancellationToken,
    session: SessionHandle,
    session_join: JoinHandle<SessionResult<()>>,
    orders: Arc<OrderManager>,
    books: HashMap<String, BookHandle>,
    book_joins: Vec<JoinHandle<()>>,
    kraken_join: Option<JoinHandle<()>>,
    app_rx: mpsc::Receiver<FixMessage>,
    event_rx: mpsc::Receiver<EngineEvent>,
    event_tx: mpsc::Sender<EngineEvent>,
    update_rx: mpsc::Receiver<NormalizedUpdate>,
    /// Ingress for pre-normalized payloads from embedding processes. Also
    /// keeps the update channel open when the Kraken feed is disabled.
    update_tx: mpsc::Sender<NormalizedUpdate>,
}

impl Application {
    /// Assemble the application from configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let cancel = CancellationToken::new();
        let (app_tx, app_rx) = mpsc::channel(APP_CHANNEL_DEPTH);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_DEPTH);

        let credentials = Credentials::new(config.username.clone(), config.secret.clone());
        let (session, session_join) = FixSession::spawn(
            config.session_config(),
            credentials,
            app_tx,
            event_tx.clone(),
            cancel.clone(),
        );

        let orders = Arc::new(OrderManager::new(OrderManagerConfig {
            client_party_id: config.client_party_id.clone(),
            exec_inst: "6".to_string(),
        }));

        let kraken_join = config.kraken_config().map(|kraken_config| {
            let feed = KrakenFeed::new(kraken_config, update_tx.clone(), cancel.clone());
            tokio::spawn(feed.run())
        });

        Ok(Self {
            config,
            cancel,
            session,
            session_join,
            orders,
            books: HashMap::new(),
            book_joins: Vec::new(),
            kraken_join,
            app_rx,
            event_rx,
            event_tx,
            update_rx,
            update_tx,
        })
    }

    /// Handle to the order manager for embedding strategies.
    pub fn orders(&self) -> Arc<OrderManager> {
        self.orders.clone()
    }

    /// Push a pre-normalized book payload straight into the book engine,
    /// bypassing the FIX demux. Non-FIX feeds enter here.
    pub async fn push_update(&self, update: NormalizedUpdate) -> AppResult<()> {
        self.update_tx
            .send(update)
            .await
            .map_err(|_| AppError::Shutdown)
    }

    /// Book handle for a symbol, spawning its engine on first use.
    pub async fn book(&mut self, symbol: &str) -> AppResult<BookHandle> {
        if let Some(handle) = self.books.get(symbol) {
            return Ok(handle.clone());
        }

        let (handle, join) =
            BookEngine::spawn(symbol, self.config.book_config(), self.cancel.clone());

        // Bridge published snapshots into the engine event stream.
        let event_tx = self.event_tx.clone();
        let event_symbol = symbol.to_string();
        handle
            .subscribe(Box::new(move |snapshot| {
                metrics::BOOK_PUBLISHED_TOTAL
                    .with_label_values(&[&event_symbol])
                    .inc();
                let _ = event_tx.try_send(EngineEvent::BookSnapshot {
                    symbol: event_symbol.clone(),
                    snapshot: Box::new(snapshot),
                });
            }))
            .await?;

        self.books.insert(symbol.to_string(), handle.clone());
        self.book_joins.push(join);
        Ok(handle)
    }

    /// Place an order: validate, track, and emit the 35=D.
    pub async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Size,
        price: Option<Price>,
        tif: TimeInForce,
    ) -> AppResult<Order> {
        let (order, outbound) =
            self.orders
                .place(ClientOrderId::new(), symbol, side, kind, qty, price, tif)?;
        if let Some(outbound) = outbound {
            self.session
                .send_app(outbound.msg_type, outbound.body)
                .await?;
        }
        Ok(order)
    }

    /// Cancel an order via cancel-replace with quantity zero.
    pub async fn cancel_order(&mut self, client_order_id: &ClientOrderId) -> AppResult<()> {
        let outbound = self.orders.cancel(client_order_id)?;
        self.session
            .send_app(outbound.msg_type, outbound.body)
            .await?;
        Ok(())
    }

    /// Run the supervisor loop until shutdown or a fatal error.
    pub async fn run(&mut self) -> AppResult<()> {
        // Book engines and subscriptions for every configured symbol.
        for symbol in self.config.symbols.clone() {
            self.book(&symbol).await?;
            self.session
                .subscribe(symbol.clone(), self.config.market_depth)
                .await?;
        }
        info!(
            symbols = ?self.config.symbols,
            kraken = self.kraken_join.is_some(),
            "application running"
        );

        let result = self.supervise().await;

        self.shutdown().await;
        result
    }

    async fn supervise(&mut self) -> AppResult<()> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received; shutting down");
                    return Ok(());
                }
                msg = self.app_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_fix_message(msg).await,
                        None => {
                            warn!("application channel closed");
                            return Ok(());
                        }
                    }
                }
                update = self.update_rx.recv() => {
                    if let Some(update) = update {
                        self.route_update(update).await;
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle_event(event) {
                                return Err(e);
                            }
                        }
                        None => return Ok(()),
                    }
                }
                join = &mut self.session_join => {
                    return match join {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => {
                            error!(%e, "session task ended");
                            Err(e.into())
                        }
                        Err(e) => Err(AppError::Config(format!("session task panicked: {e}"))),
                    };
                }
            }
        }
    }

    /// Route an application-level FIX message.
    async fn handle_fix_message(&mut self, msg: FixMessage) {
        match msg.msg_type() {
            Ok(MsgType::ExecutionReport) => {
                let report = match ExecReport::parse(&msg) {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(%e, "unparseable execution report");
                        return;
                    }
                };
                match self.orders.apply_report(&report) {
                    Ok(events) => {
                        for event in events {
                            if matches!(event, EngineEvent::OrderRejected { .. }) {
                                metrics::ORDER_REJECTS_TOTAL
                                    .with_label_values(&["business"])
                                    .inc();
                            }
                            // This task drains event_rx itself; a blocking
                            // send here could deadlock on a full channel.
                            if self.event_tx.try_send(event).is_err() {
                                warn!("event channel full; dropping event");
                            }
                        }
                    }
                    Err(e) => warn!(%e, "execution report for unknown order"),
                }
            }
            Ok(MsgType::MarketDataSnapshot) | Ok(MsgType::MarketDataIncremental) => {
                let events = match demux_message(&msg) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(%e, "market data demux failed");
                        return;
                    }
                };
                for event in events {
                    self.route_market_data(event).await;
                }
            }
            other => {
                debug!(msg_type = ?other, "unhandled application message");
            }
        }
    }

    async fn route_market_data(&mut self, event: MarketDataEvent) {
        match event {
            MarketDataEvent::Replace {
                symbol,
                bids,
                asks,
                ..
            } => {
                let update = NormalizedUpdate::from_levels(
                    symbol.clone(),
                    truex_core::BookSource::Fix,
                    Some(bids),
                    Some(asks),
                );
                self.route_update(update).await;
            }
            MarketDataEvent::Deltas {
                symbol,
                deltas,
                timestamp_ms,
            } => match self.book(&symbol).await {
                Ok(book) => {
                    if let Err(e) = book
                        .apply_deltas(deltas, truex_core::BookSource::Fix, timestamp_ms)
                        .await
                    {
                        warn!(%symbol, %e, "delta routing failed");
                    }
                }
                Err(e) => warn!(%symbol, %e, "no book engine for deltas"),
            },
            MarketDataEvent::Trade(trade) => {
                let event = EngineEvent::Trade {
                    symbol: trade.symbol,
                    price: trade.price,
                    size: trade.size,
                    side: trade.aggressor,
                };
                if self.event_tx.try_send(event).is_err() {
                    warn!("event channel full; dropping trade");
                }
            }
            MarketDataEvent::SubscriptionRejected { md_req_id, reason } => {
                // The session already deleted the registry entry.
                debug!(%md_req_id, %reason, "subscription reject passed through demux");
            }
        }
    }

    async fn route_update(&mut self, update: NormalizedUpdate) {
        let symbol = update.symbol.clone();
        match self.book(&symbol).await {
            Ok(book) => {
                if let Err(e) = book.update(update).await {
                    warn!(%symbol, %e, "book update routing failed");
                }
            }
            Err(e) => warn!(%symbol, %e, "no book engine for update"),
        }
    }

    /// React to an engine event. Only fatal auth errors end the run.
    fn handle_event(&mut self, event: EngineEvent) -> AppResult<()> {
        match &event {
            EngineEvent::Connected => info!("session connected"),
            EngineEvent::Disconnected { reason } => warn!(%reason, "session disconnected"),
            EngineEvent::FatalAuthError { reason } => {
                metrics::ORDER_REJECTS_TOTAL
                    .with_label_values(&["fatal_auth"])
                    .inc();
                error!(%reason, "fatal auth error; stopping");
                return Err(AppError::FatalAuth(reason.clone()));
            }
            EngineEvent::BookSnapshot { symbol, snapshot } => {
                debug!(
                    %symbol,
                    best_bid = ?snapshot.best_bid,
                    best_ask = ?snapshot.best_ask,
                    inverted = snapshot.is_inverted,
                    volatile = snapshot.is_volatile,
                    "book snapshot"
                );
            }
            EngineEvent::Trade {
                symbol,
                price,
                size,
                ..
            } => debug!(%symbol, %price, %size, "trade"),
            EngineEvent::OrderAck { order } => {
                info!(cloid = %order.client_order_id, status = %order.status, "order ack")
            }
            EngineEvent::OrderRejected { order, reason } => {
                warn!(cloid = %order.client_order_id, %reason, "order rejected")
            }
            EngineEvent::OrderFilled { order, fill } => {
                info!(
                    cloid = %order.client_order_id,
                    price = %fill.price,
                    size = %fill.size,
                    "fill"
                )
            }
            EngineEvent::SubscriptionRejected { symbol, reason } => {
                warn!(%symbol, %reason, "subscription rejected")
            }
        }
        Ok(())
    }

    /// Cancel every child task and wait for them to release their
    /// sockets and mailboxes.
    async fn shutdown(&mut self) {
        info!("shutting down");
        self.cancel.cancel();

        for join in self.book_joins.drain(..) {
            let _ = join.await;
        }
        if let Some(join) = self.kraken_join.take() {
            let _ = join.await;
        }
        // The session task may already have ended inside supervise(); a
        // finished JoinHandle must not be polled again.
        if !self.session_join.is_finished() {
            let _ =
                tokio::time::timeout(std::time::Duration::from_secs(5), &mut self.session_join)
                    .await;
        }
        info!("shutdown complete");
    }
}
