//! Mock FIX exchange for integration tests.
//!
//! Accepts TCP connections, parses inbound frames, auto-acknowledges
//! logons, records everything received, and lets tests inject messages or
//! sever the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use truex_fix::{decode, extract_frame, tags, FixMessage, FrameBuilder, MsgType};

/// Commands a test can issue against the active connection.
enum ServerCmd {
    /// Send a message built from type and body fields.
    Send(MsgType, Vec<(u32, String)>),
    /// Drop the current connection.
    Sever,
}

/// A mock FIX exchange listening on an ephemeral port.
pub struct MockFixServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    received: Arc<Mutex<Vec<FixMessage>>>,
    conn_cmd: Arc<Mutex<Option<mpsc::Sender<ServerCmd>>>>,
    connections: Arc<Mutex<u32>>,
    auto_ack_logon: bool,
}

impl MockFixServer {
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Start with explicit control over logon auto-acknowledgement.
    pub async fn start_with(auto_ack_logon: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received: Arc<Mutex<Vec<FixMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let conn_cmd: Arc<Mutex<Option<mpsc::Sender<ServerCmd>>>> = Arc::new(Mutex::new(None));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let received_clone = received.clone();
        let conn_cmd_clone = conn_cmd.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let (cmd_tx, cmd_rx) = mpsc::channel(16);
                        *conn_cmd_clone.lock().await = Some(cmd_tx);
                        {
                            let mut count = connections_clone.lock().await;
                            *count += 1;
                        }
                        let received = received_clone.clone();
                        tokio::spawn(handle_connection(stream, received, cmd_rx, auto_ack_logon));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            received,
            conn_cmd,
            connections,
            auto_ack_logon,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// All messages received so far, in arrival order.
    pub async fn received(&self) -> Vec<FixMessage> {
        self.received.lock().await.clone()
    }

    /// Messages of one type, in arrival order.
    pub async fn received_of_type(&self, msg_type: MsgType) -> Vec<FixMessage> {
        self.received()
            .await
            .into_iter()
            .filter(|m| m.msg_type().ok() == Some(msg_type))
            .collect()
    }

    /// Inject a message into the active connection.
    pub async fn send(&self, msg_type: MsgType, body: Vec<(u32, String)>) {
        let guard = self.conn_cmd.lock().await;
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(ServerCmd::Send(msg_type, body)).await;
        }
    }

    /// Drop the active connection without a logout.
    pub async fn sever(&self) {
        let guard = self.conn_cmd.lock().await;
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(ServerCmd::Sever).await;
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// True when this server auto-acknowledges logons.
    pub fn acks_logon(&self) -> bool {
        self.auto_ack_logon
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    received: Arc<Mutex<Vec<FixMessage>>>,
    mut cmd_rx: mpsc::Receiver<ServerCmd>,
    auto_ack_logon: bool,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut out_seq: u64 = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ServerCmd::Send(msg_type, body)) => {
                        let frame = build_frame(msg_type, out_seq, &body);
                        out_seq += 1;
                        if stream.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                    Some(ServerCmd::Sever) | None => {
                        let _ = stream.shutdown().await;
                        return;
                    }
                }
            }
            read = stream.read(&mut chunk) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);

                while let Some((frame, consumed)) = extract_frame(&buf) {
                    buf.drain(..consumed);
                    let Ok(msg) = decode(&frame) else { continue };
                    let is_logon = msg.msg_type().ok() == Some(MsgType::Logon);
                    received.lock().await.push(msg);

                    if is_logon && auto_ack_logon {
                        let ack = build_frame(
                            MsgType::Logon,
                            out_seq,
                            &[
                                (tags::ENCRYPT_METHOD, "0".to_string()),
                                (tags::HEART_BT_INT, "30".to_string()),
                                (tags::RESET_SEQ_NUM_FLAG, "Y".to_string()),
                                (tags::DEFAULT_APPL_VER_ID, "FIX.5.0SP2".to_string()),
                            ],
                        );
                        out_seq += 1;
                        if stream.write_all(&ack).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn build_frame(msg_type: MsgType, seq: u64, body: &[(u32, String)]) -> Vec<u8> {
    let mut builder = FrameBuilder::new(msg_type).header(
        "TRUEX_UAT_OE",
        "CLI",
        seq,
        "20251006-14:30:00.000",
    );
    for (tag, value) in body {
        builder = builder.field(*tag, value.clone());
    }
    builder.build()
}
