//! Shared helpers for integration tests: in-process hub with a mock
//! persistence collaborator, token minting, and WebSocket plumbing.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pulse_hub::config::Config;
use pulse_hub::identity;
use pulse_hub::persist::{PersistClient, PersistError, PersistedMessage};
use pulse_hub::routes;
use pulse_hub::state::{self, AppState};

/// Shared secret; tests stand in for the auth collaborator.
pub const TEST_SECRET: &[u8] = b"pulse-hub-test-identity-secret";

/// Mock persistence store: counts calls, assigns sequential ids, and can
/// be flipped into a failing or artificially slow state.
pub struct MockPersist {
    pub calls: AtomicU64,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl MockPersist {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        })
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistClient for MockPersist {
    async fn create_message(
        &self,
        _sender_id: &str,
        _recipient_id: &str,
        _body: &str,
    ) -> Result<PersistedMessage, PersistError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("injected failure".to_string()));
        }
        Ok(PersistedMessage {
            id: format!("msg-{}", n),
            created_at: Utc::now(),
        })
    }
}

/// Start the hub on an ephemeral port with the given persistence client.
pub async fn spawn_hub(persist: Arc<dyn PersistClient>) -> (SocketAddr, AppState) {
    spawn_hub_with_config(persist, Config::default()).await
}

pub async fn spawn_hub_with_config(
    persist: Arc<dyn PersistClient>,
    config: Config,
) -> (SocketAddr, AppState) {
    let state = state::build_state(&config, persist, TEST_SECRET.to_vec());
    let app = routes::build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

pub fn token_for(user_id: &str) -> String {
    identity::issue_identity_token(TEST_SECRET, user_id, 3600).unwrap()
}

pub type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
pub type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Open an authenticated WebSocket connection for `user_id`.
pub async fn connect(addr: SocketAddr, user_id: &str) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}/ws?token={}", addr, token_for(user_id));
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

/// Next JSON text frame within `wait`, skipping pings/pongs. None on
/// timeout or stream end.
pub async fn next_json(read: &mut WsRead, wait: Duration) -> Option<serde_json::Value> {
    loop {
        match tokio::time::timeout(wait, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("invalid JSON frame"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Next frame of the given `type` tag within `wait`, skipping others
/// (e.g. the initial presence snapshot).
pub async fn next_frame_of_type(
    read: &mut WsRead,
    frame_type: &str,
    wait: Duration,
) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let frame = next_json(read, remaining).await?;
        if frame["type"] == frame_type {
            return Some(frame);
        }
    }
}

/// Drain whatever frames arrive within a short window (used to discard
/// initial presence snapshots before the interesting part of a test).
pub async fn drain_frames(read: &mut WsRead) {
    while next_json(read, Duration::from_millis(200)).await.is_some() {}
}

/// Build a submit request envelope.
pub fn submit_envelope(request_id: &str, recipient_id: &str, body: &str) -> Message {
    let envelope = serde_json::json!({
        "request_id": request_id,
        "type": "submit",
        "recipient_id": recipient_id,
        "body": body,
    });
    Message::Text(envelope.to_string().into())
}

/// Build a presence subscribe/unsubscribe envelope.
pub fn presence_envelope(request_id: &str, kind: &str, target_id: &str) -> Message {
    let envelope = serde_json::json!({
        "request_id": request_id,
        "type": kind,
        "target_id": target_id,
    });
    Message::Text(envelope.to_string().into())
}
