//! FIX session state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting --tcp_up--> LogonSent
//!   LogonSent --35=A accepted--> LoggedIn
//!   LoggedIn --35=5 sent--> LogoutInProgress --tcp_close--> Disconnected
//!   Any --error/close--> Disconnected
//! ```
//!
//! The session task is the single owner of sequence numbers, state, and
//! timers. Commands arrive over a bounded mailbox; application messages go
//! out to the demux channel; business outcomes go out as engine events.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::subscription::SubscriptionManager;
use crate::transport::Transport;
use chrono::Utc;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use truex_core::{Credentials, EngineEvent};
use truex_fix::{
    decode, format_sending_time, sign_password, tags, FixMessage, FrameBuilder, MsgType,
};
use uuid::Uuid;

const COMMAND_MAILBOX_DEPTH: usize = 64;
const TIMER_TICK: Duration = Duration::from_millis(500);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LogonSent,
    LoggedIn,
    LogoutInProgress,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::LogonSent => "logon_sent",
            Self::LoggedIn => "logged_in",
            Self::LogoutInProgress => "logout_in_progress",
        };
        write!(f, "{s}")
    }
}

/// Commands accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send an application message; the session adds header, sequence
    /// number, and trailer.
    SendApp {
        msg_type: MsgType,
        body: Vec<(u32, String)>,
    },
    /// Subscribe to market data for a symbol.
    Subscribe { symbol: String, depth: u32 },
    /// Initiate an orderly logout.
    Logout,
}

/// Cheap handle for talking to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }

    /// Queue an application message (order, cancel) for sending.
    pub async fn send_app(
        &self,
        msg_type: MsgType,
        body: Vec<(u32, String)>,
    ) -> SessionResult<()> {
        self.send(SessionCommand::SendApp { msg_type, body }).await
    }

    /// Subscribe to market data for a symbol.
    pub async fn subscribe(&self, symbol: impl Into<String>, depth: u32) -> SessionResult<()> {
        self.send(SessionCommand::Subscribe {
            symbol: symbol.into(),
            depth,
        })
        .await
    }

    /// Request an orderly logout.
    pub async fn logout(&self) -> SessionResult<()> {
        self.send(SessionCommand::Logout).await
    }

    async fn send(&self, cmd: SessionCommand) -> SessionResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// How a single connection ended.
enum ConnectionOutcome {
    /// Orderly shutdown; do not reconnect.
    Shutdown,
    /// Connection lost; reconnect with backoff.
    Lost(String),
}

/// The FIX session task.
pub struct FixSession {
    config: SessionConfig,
    credentials: Credentials,
    transport: Transport,
    subscriptions: Arc<SubscriptionManager>,
    state: Arc<RwLock<SessionState>>,
    outbound_seq: u64,
    inbound_expected: u64,
    last_sent: Instant,
    last_inbound: Instant,
    pending_test_request: Option<Instant>,
    reached_logon: bool,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    app_tx: mpsc::Sender<FixMessage>,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
}

impl FixSession {
    /// Spawn the session task.
    ///
    /// Application messages (35=8, W, X) are forwarded on `app_tx`;
    /// lifecycle outcomes are surfaced on `event_tx`.
    pub fn spawn(
        config: SessionConfig,
        credentials: Credentials,
        app_tx: mpsc::Sender<FixMessage>,
        event_tx: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> (SessionHandle, JoinHandle<SessionResult<()>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_MAILBOX_DEPTH);
        let state = Arc::new(RwLock::new(SessionState::Disconnected));

        let session = Self {
            config,
            credentials,
            transport: Transport::new(),
            subscriptions: Arc::new(SubscriptionManager::new()),
            state: state.clone(),
            outbound_seq: 1,
            inbound_expected: 1,
            last_sent: Instant::now(),
            last_inbound: Instant::now(),
            pending_test_request: None,
            reached_logon: false,
            cmd_rx,
            app_tx,
            event_tx,
            cancel,
        };

        let handle = SessionHandle { cmd_tx, state };
        let join = tokio::spawn(session.run());
        (handle, join)
    }

    async fn run(mut self) -> SessionResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(SessionState::Disconnected);
                return Ok(());
            }

            self.reached_logon = false;
            let result = self.run_connection().await;
            self.transport.close().await;
            self.set_state(SessionState::Disconnected);

            match result {
                Ok(ConnectionOutcome::Shutdown) => {
                    info!("session shut down");
                    return Ok(());
                }
                Ok(ConnectionOutcome::Lost(reason)) => {
                    warn!(%reason, "connection lost");
                    self.event(EngineEvent::Disconnected { reason }).await;
                }
                Err(e) if e.is_fatal() => {
                    error!(%e, "fatal session error; not reconnecting");
                    return Err(e);
                }
                Err(e) => {
                    warn!(%e, "connection error");
                    self.event(EngineEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                }
            }

            if self.reached_logon {
                attempt = 0;
            }
            attempt += 1;
            if attempt > self.config.reconnect_max_attempts {
                error!(attempts = attempt - 1, "reconnect attempts exhausted");
                return Err(SessionError::ReconnectExhausted {
                    attempts: attempt - 1,
                });
            }

            let delay = self.config.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "reconnecting");
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.set_state(SessionState::Disconnected);
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_connection(&mut self) -> SessionResult<ConnectionOutcome> {
        self.set_state(SessionState::Connecting);
        let host = self.config.host.clone();
        self.transport
            .connect(&host, self.config.port, self.config.logon_timeout())
            .await?;

        // ResetSeqNumFlag=Y: both counters restart at 1.
        self.outbound_seq = 1;
        self.inbound_expected = 1;
        self.pending_test_request = None;
        self.last_inbound = Instant::now();

        self.set_state(SessionState::LogonSent);
        self.send_logon().await?;
        self.await_logon().await?;

        self.set_state(SessionState::LoggedIn);
        self.reached_logon = true;
        info!(
            sender = %self.config.sender_comp_id,
            target = %self.config.target_comp_id,
            "logged in"
        );
        self.event(EngineEvent::Connected).await;

        self.resubscribe().await?;
        self.main_loop().await
    }

    /// Wait for the logon acknowledgement under the logon deadline.
    async fn await_logon(&mut self) -> SessionResult<()> {
        let deadline = tokio::time::sleep(self.config.logon_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    error!("logon deadline passed");
                    return Err(SessionError::LogonTimeout);
                }
                _ = self.cancel.cancelled() => {
                    return Err(SessionError::ChannelClosed);
                }
                frame = self.transport.read_frame() => {
                    let Some(bytes) = frame? else {
                        return Err(SessionError::Protocol(
                            "connection closed during logon".to_string(),
                        ));
                    };
                    let msg = match decode(&bytes) {
                        Ok(msg) => msg,
                        Err(e) if e.is_frame_local() => {
                            warn!(%e, "dropping malformed frame during logon");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.note_inbound();

                    match msg.msg_type() {
                        Ok(MsgType::Logon) => {
                            if let Ok(seq) = msg.seq_num() {
                                self.inbound_expected = seq + 1;
                            }
                            return Ok(());
                        }
                        Ok(MsgType::Logout) => {
                            let text = msg.get(tags::TEXT).unwrap_or("logout").to_string();
                            if is_invalid_client(&text) {
                                self.event(EngineEvent::FatalAuthError {
                                    reason: text.clone(),
                                })
                                .await;
                                return Err(SessionError::FatalAuth(text));
                            }
                            return Err(SessionError::Protocol(format!(
                                "logout during logon: {text}"
                            )));
                        }
                        _ => {
                            debug!(msg_type = ?msg.msg_type_raw(), "message before logon ack; ignoring");
                        }
                    }
                }
            }
        }
    }

    async fn main_loop(&mut self) -> SessionResult<ConnectionOutcome> {
        let mut ticker = tokio::time::interval(TIMER_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = self.send_logout("shutting down").await;
                    self.set_state(SessionState::LogoutInProgress);
                    return Ok(ConnectionOutcome::Shutdown);
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => {
                            let _ = self.send_logout("handle dropped").await;
                            return Ok(ConnectionOutcome::Shutdown);
                        }
                        Some(cmd) => self.handle_command(cmd).await?,
                    }
                }
                frame = self.transport.read_frame() => {
                    match frame? {
                        Some(bytes) => {
                            if let Some(outcome) = self.handle_frame(&bytes).await? {
                                return Ok(outcome);
                            }
                        }
                        None => {
                            return Ok(ConnectionOutcome::Lost("remote closed".to_string()));
                        }
                    }
                }
                _ = ticker.tick() => self.check_timers().await?,
            }
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> SessionResult<()> {
        match cmd {
            SessionCommand::SendApp { msg_type, body } => {
                self.send_message(msg_type, &body).await
            }
            SessionCommand::Subscribe { symbol, depth } => {
                let sub = self.subscriptions.add(&symbol, depth);
                info!(symbol = %sub.symbol, md_req_id = %sub.md_req_id, "subscribing");
                self.send_message(MsgType::MarketDataRequest, &sub.request_body())
                    .await
            }
            SessionCommand::Logout => {
                self.send_logout("client logout").await?;
                self.set_state(SessionState::LogoutInProgress);
                Ok(())
            }
        }
    }

    /// Process one inbound frame. Returns an outcome when the connection
    /// must end.
    async fn handle_frame(&mut self, bytes: &[u8]) -> SessionResult<Option<ConnectionOutcome>> {
        let msg = match decode(bytes) {
            Ok(msg) => msg,
            Err(e) if e.is_frame_local() => {
                warn!(%e, "dropping malformed frame");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.note_inbound();

        let msg_type = msg.msg_type().ok();

        // Sequence bookkeeping. A reset realigns the expected counter; a
        // gap triggers a resend request and the out-of-order message is
        // discarded (the exchange re-delivers it in order).
        if msg_type == Some(MsgType::SequenceReset) {
            if let Some(new_seq) = msg.get(tags::NEW_SEQ_NO).and_then(|v| v.parse().ok()) {
                info!(new_seq, "sequence reset");
                self.inbound_expected = new_seq;
            }
            return Ok(None);
        }
        if let Ok(seq) = msg.seq_num() {
            if seq < self.inbound_expected {
                debug!(seq, expected = self.inbound_expected, "duplicate message; ignoring");
                return Ok(None);
            }
            if seq > self.inbound_expected {
                warn!(seq, expected = self.inbound_expected, "sequence gap");
                self.send_resend_request().await?;
                return Ok(None);
            }
            self.inbound_expected += 1;
        }

        let Some(msg_type) = msg_type else {
            warn!(raw = ?msg.msg_type_raw(), "unknown message type; dropping");
            return Ok(None);
        };

        match msg_type {
            MsgType::Heartbeat => {
                // Inbound activity already cleared any pending TestRequest.
            }
            MsgType::TestRequest => {
                let test_req_id = msg.get(tags::TEST_REQ_ID).unwrap_or_default().to_string();
                debug!(%test_req_id, "answering test request");
                self.send_message(
                    MsgType::Heartbeat,
                    &[(tags::TEST_REQ_ID, test_req_id)],
                )
                .await?;
            }
            MsgType::ResendRequest => {
                // We reset sequence numbers on every logon, so a gap fill
                // up to the current counter satisfies the request.
                let new_seq = self.outbound_seq.to_string();
                self.send_message(
                    MsgType::SequenceReset,
                    &[
                        (tags::GAP_FILL_FLAG, "Y".to_string()),
                        (tags::NEW_SEQ_NO, new_seq),
                    ],
                )
                .await?;
            }
            MsgType::Logout => {
                let text = msg.get(tags::TEXT).unwrap_or("logout").to_string();
                if is_invalid_client(&text) {
                    self.event(EngineEvent::FatalAuthError {
                        reason: text.clone(),
                    })
                    .await;
                    return Err(SessionError::FatalAuth(text));
                }
                if *self.state.read() == SessionState::LogoutInProgress {
                    return Ok(Some(ConnectionOutcome::Shutdown));
                }
                return Ok(Some(ConnectionOutcome::Lost(format!(
                    "logout from exchange: {text}"
                ))));
            }
            MsgType::Logon => {
                debug!("unexpected logon while logged in; ignoring");
            }
            MsgType::MarketDataRequestReject => {
                let md_req_id = msg.get(tags::MD_REQ_ID).unwrap_or_default();
                let reason = msg
                    .get(tags::TEXT)
                    .unwrap_or("market data request rejected")
                    .to_string();
                if let Some(sub) = self.subscriptions.remove_by_req_id(md_req_id) {
                    warn!(symbol = %sub.symbol, %reason, "subscription rejected");
                    self.event(EngineEvent::SubscriptionRejected {
                        symbol: sub.symbol,
                        reason,
                    })
                    .await;
                } else {
                    warn!(md_req_id, %reason, "reject for unknown subscription");
                }
            }
            _ => {
                // Application message: execution reports, market data.
                if self.app_tx.send(msg).await.is_err() {
                    warn!("application receiver dropped");
                }
            }
        }

        Ok(None)
    }

    /// Heartbeat and test-request timers.
    async fn check_timers(&mut self) -> SessionResult<()> {
        let now = Instant::now();

        if let Some(sent_at) = self.pending_test_request {
            if now.duration_since(sent_at) >= self.config.heartbeat_interval() {
                error!("no response to test request; tearing down transport");
                return Err(SessionError::TestRequestTimeout);
            }
        } else if now.duration_since(self.last_inbound) >= self.config.test_request_after() {
            let test_req_id = format!("TR-{}", &Uuid::new_v4().to_string()[..8]);
            warn!(%test_req_id, "inbound quiet; sending test request");
            self.send_message(MsgType::TestRequest, &[(tags::TEST_REQ_ID, test_req_id)])
                .await?;
            self.pending_test_request = Some(Instant::now());
        }

        if now.duration_since(self.last_sent) >= self.config.heartbeat_interval() {
            self.send_message(MsgType::Heartbeat, &[]).await?;
        }

        Ok(())
    }

    /// Re-send every active subscription with a fresh MDReqID.
    async fn resubscribe(&mut self) -> SessionResult<()> {
        let subs = self.subscriptions.rehydrate();
        if subs.is_empty() {
            return Ok(());
        }
        info!(count = subs.len(), "resubscribing market data");
        for sub in subs {
            self.send_message(MsgType::MarketDataRequest, &sub.request_body())
                .await?;
        }
        Ok(())
    }

    /// Logon with HMAC password over the exact header values being sent.
    async fn send_logon(&mut self) -> SessionResult<()> {
        let sending_time = format_sending_time(Utc::now());
        let seq = self.outbound_seq;
        let password = sign_password(
            &self.credentials,
            &sending_time,
            MsgType::Logon.as_str(),
            seq,
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
        );

        let frame = FrameBuilder::new(MsgType::Logon)
            .header(
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                seq,
                &sending_time,
            )
            .field(tags::ENCRYPT_METHOD, "0")
            .field(tags::HEART_BT_INT, self.config.heartbeat_interval_s.to_string())
            .field(tags::RESET_SEQ_NUM_FLAG, "Y")
            .field(tags::USERNAME, self.credentials.username())
            .field(tags::PASSWORD, password)
            .field(tags::DEFAULT_APPL_VER_ID, "FIX.5.0SP2")
            .build();

        self.outbound_seq += 1;
        self.last_sent = Instant::now();
        self.transport.send(frame).await
    }

    async fn send_logout(&mut self, reason: &str) -> SessionResult<()> {
        self.send_message(MsgType::Logout, &[(tags::TEXT, reason.to_string())])
            .await
    }

    async fn send_resend_request(&mut self) -> SessionResult<()> {
        let begin = self.inbound_expected.to_string();
        self.send_message(
            MsgType::ResendRequest,
            &[
                (tags::BEGIN_SEQ_NO, begin),
                (tags::END_SEQ_NO, "0".to_string()),
            ],
        )
        .await
    }

    /// Emit one message with header, next sequence number, and trailer.
    async fn send_message(&mut self, msg_type: MsgType, body: &[(u32, String)]) -> SessionResult<()> {
        let sending_time = format_sending_time(Utc::now());
        let mut builder = FrameBuilder::new(msg_type).header(
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            self.outbound_seq,
            &sending_time,
        );
        for (tag, value) in body {
            builder = builder.field(*tag, value.clone());
        }

        self.outbound_seq += 1;
        self.last_sent = Instant::now();
        self.transport.send(builder.build()).await
    }

    fn note_inbound(&mut self) {
        self.last_inbound = Instant::now();
        self.pending_test_request = None;
    }

    fn set_state(&self, state: SessionState) {
        let mut guard = self.state.write();
        if *guard != state {
            debug!(from = %*guard, to = %state, "session state");
            *guard = state;
        }
    }

    async fn event(&self, event: EngineEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("event receiver dropped");
        }
    }
}

fn is_invalid_client(text: &str) -> bool {
    text.to_lowercase().contains("invalid client")
}
