//! Session lifecycle integration tests.
//!
//! Drives a real session task against a mock FIX exchange:
//! - Logon round-trip and sequence numbering
//! - Heartbeat reply to TestRequest
//! - Reconnect with automatic resubscribe
//! - Fatal logout handling

mod integration;
use integration::common::mock_fix::MockFixServer;

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use truex_core::{Credentials, EngineEvent};
use truex_fix::{tags, FixMessage, MsgType};
use truex_session::{FixSession, SessionConfig, SessionError, SessionHandle};

fn test_config(server: &MockFixServer) -> SessionConfig {
    SessionConfig {
        host: server.host(),
        port: server.port(),
        sender_comp_id: "CLI".to_string(),
        target_comp_id: "TRUEX_UAT_OE".to_string(),
        heartbeat_interval_s: 30,
        reconnect_base_ms: 50,
        reconnect_cap_ms: 200,
        reconnect_max_attempts: 5,
        logon_timeout_ms: 2000,
    }
}

fn spawn_session(
    config: SessionConfig,
) -> (
    SessionHandle,
    tokio::task::JoinHandle<Result<(), SessionError>>,
    mpsc::Receiver<FixMessage>,
    mpsc::Receiver<EngineEvent>,
    CancellationToken,
) {
    let (app_tx, app_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let credentials = Credentials::new("USER", "test-secret");
    let (handle, join) = FixSession::spawn(config, credentials, app_tx, event_tx, cancel.clone());
    (handle, join, app_rx, event_rx, cancel)
}

/// Poll a condition until it holds or the timeout passes.
async fn eventually<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_logon_round_trip() {
    let server = MockFixServer::start().await;
    let config = test_config(&server);
    let (handle, join, _app_rx, mut event_rx, cancel) = spawn_session(config);

    assert!(
        eventually(Duration::from_secs(3), || async { handle.is_logged_in() }).await,
        "session should reach LoggedIn"
    );

    // The logon carried the full authenticated field set with seq 1.
    let logons = server.received_of_type(MsgType::Logon).await;
    assert_eq!(logons.len(), 1);
    let logon = &logons[0];
    assert_eq!(logon.seq_num().unwrap(), 1);
    assert_eq!(logon.get(tags::SENDER_COMP_ID), Some("CLI"));
    assert_eq!(logon.get(tags::TARGET_COMP_ID), Some("TRUEX_UAT_OE"));
    assert_eq!(logon.get(tags::ENCRYPT_METHOD), Some("0"));
    assert_eq!(logon.get(tags::HEART_BT_INT), Some("30"));
    assert_eq!(logon.get(tags::RESET_SEQ_NUM_FLAG), Some("Y"));
    assert_eq!(logon.get(tags::USERNAME), Some("USER"));
    assert!(logon.get(tags::PASSWORD).is_some_and(|p| !p.is_empty()));
    assert_eq!(logon.get(tags::DEFAULT_APPL_VER_ID), Some("FIX.5.0SP2"));

    // Connected event surfaced.
    let event = event_rx.recv().await.unwrap();
    assert!(matches!(event, EngineEvent::Connected));

    cancel.cancel();
    let _ = join.await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_echoes_test_request() {
    let server = MockFixServer::start().await;
    let config = test_config(&server);
    let (handle, join, _app_rx, _event_rx, cancel) = spawn_session(config);

    assert!(eventually(Duration::from_secs(3), || async { handle.is_logged_in() }).await);

    server
        .send(
            MsgType::TestRequest,
            vec![(tags::TEST_REQ_ID, "PING".to_string())],
        )
        .await;

    assert!(
        eventually(Duration::from_secs(2), || async {
            !server.received_of_type(MsgType::Heartbeat).await.is_empty()
        })
        .await,
        "heartbeat reply expected"
    );

    let heartbeats = server.received_of_type(MsgType::Heartbeat).await;
    let reply = &heartbeats[0];
    assert_eq!(reply.get(tags::TEST_REQ_ID), Some("PING"));
    // Logon was seq 1; the heartbeat is the next emission.
    assert_eq!(reply.seq_num().unwrap(), 2);

    cancel.cancel();
    let _ = join.await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_resubscribes_with_fresh_md_req_id() {
    let server = MockFixServer::start().await;
    let config = test_config(&server);
    let (handle, join, _app_rx, _event_rx, cancel) = spawn_session(config);

    assert!(eventually(Duration::from_secs(3), || async { handle.is_logged_in() }).await);

    handle.subscribe("BTC-PYUSD", 10).await.unwrap();
    assert!(
        eventually(Duration::from_secs(2), || async {
            !server
                .received_of_type(MsgType::MarketDataRequest)
                .await
                .is_empty()
        })
        .await
    );
    let first_req = server.received_of_type(MsgType::MarketDataRequest).await[0].clone();
    let first_md_req_id = first_req.get(tags::MD_REQ_ID).unwrap().to_string();
    assert_eq!(first_req.get(tags::SYMBOL), Some("BTC-PYUSD"));

    // Sever the connection; the session must reconnect, log on again, and
    // re-send the subscription with a fresh MDReqID.
    server.sever().await;

    assert!(
        eventually(Duration::from_secs(5), || async {
            server.received_of_type(MsgType::MarketDataRequest).await.len() >= 2
        })
        .await,
        "resubscribe expected after reconnect"
    );

    assert!(server.connection_count().await >= 2);
    let requests = server.received_of_type(MsgType::MarketDataRequest).await;
    let second_req = requests.last().unwrap();
    assert_eq!(second_req.get(tags::SYMBOL), Some("BTC-PYUSD"));
    let second_md_req_id = second_req.get(tags::MD_REQ_ID).unwrap();
    assert_ne!(second_md_req_id, first_md_req_id);

    // Two logons: one per connection.
    assert_eq!(server.received_of_type(MsgType::Logon).await.len(), 2);

    cancel.cancel();
    let _ = join.await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_client_logout_is_fatal() {
    let server = MockFixServer::start().await;
    let config = test_config(&server);
    let (handle, join, _app_rx, mut event_rx, _cancel) = spawn_session(config);

    assert!(eventually(Duration::from_secs(3), || async { handle.is_logged_in() }).await);

    server
        .send(
            MsgType::Logout,
            vec![(tags::TEXT, "Invalid client".to_string())],
        )
        .await;

    // FatalAuthError surfaced (after the initial Connected).
    let mut saw_fatal = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(2), event_rx.recv()).await
    {
        if matches!(event, EngineEvent::FatalAuthError { .. }) {
            saw_fatal = true;
            break;
        }
    }
    assert!(saw_fatal, "FatalAuthError expected");

    // The task ends with the fatal error instead of reconnecting.
    let result = tokio::time::timeout(Duration::from_secs(2), join)
        .await
        .expect("session task should end")
        .unwrap();
    assert!(matches!(result, Err(SessionError::FatalAuth(_))));
    assert_eq!(server.connection_count().await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_attempts_exhausted() {
    // A server that never acknowledges logons.
    let server = MockFixServer::start_with(false).await;
    assert!(!server.acks_logon());

    let config = SessionConfig {
        logon_timeout_ms: 100,
        reconnect_max_attempts: 2,
        reconnect_base_ms: 20,
        reconnect_cap_ms: 50,
        ..test_config(&server)
    };
    let (_handle, join, _app_rx, _event_rx, _cancel) = spawn_session(config);

    let result = tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("session task should give up")
        .unwrap();
    assert!(matches!(
        result,
        Err(SessionError::ReconnectExhausted { attempts: 2 })
    ));

    // Initial connection plus two retries.
    assert_eq!(server.connection_count().await, 3);

    server.shutdown().await;
}
