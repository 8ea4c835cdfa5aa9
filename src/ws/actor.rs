use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, timeout};

use crate::events::{ServerFrame, ServerPayload};
use crate::state::AppState;
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent when admission is rejected for capacity (RFC 6455
/// "try again later").
const CLOSE_CAPACITY: u16 = 1013;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the connection's bounded outbound
///   queue. A write that exceeds the configured timeout kills the writer;
///   the bus then observes the dead queue and evicts the connection.
/// - Request task: processes client request envelopes sequentially, so a
///   slow persistence call never stalls ping/pong handling in the reader.
/// - Reader loop: handles control frames, forwards requests, and exits
///   when the client closes or the bus signals eviction.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.limits.queue_depth);
    let shutdown = Arc::new(Notify::new());

    // Register this connection; the registry enqueues the presence
    // transition for a first connection itself, in occurrence order.
    let handle = match state.registry.admit(&user_id, tx.clone(), shutdown.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "admission rejected");
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_CAPACITY,
                    reason: "At capacity, retry with backoff".into(),
                })))
                .await;
            return;
        }
    };

    // Spawn the writer before enqueuing anything, so the queue is already
    // draining while the snapshot goes out.
    let write_timeout = state.limits.write_timeout;
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, write_timeout));

    // Send the current online-users snapshot to the newly connected client
    // so its presence view starts complete, then stays current via deltas.
    // One frame regardless of how many users are online, so the snapshot
    // cannot be truncated by the bounded queue.
    let snapshot = ServerFrame::event(ServerPayload::PresenceSnapshot {
        online_users: state.registry.online_users(),
    });
    if let Ok(text) = serde_json::to_string(&snapshot) {
        let _ = tx.send(Message::Text(text.into())).await;
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %handle.id,
        "WebSocket actor started"
    );

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            // A full queue counts as a failure: the client is stalled.
            if ping_tx
                .try_send(Message::Ping(vec![1, 2, 3, 4].into()))
                .is_err()
            {
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.try_send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Spawn request task: drains client envelopes in submission order.
    let (req_tx, mut req_rx) = mpsc::channel::<Utf8Bytes>(state.limits.queue_depth);
    let req_state = state.clone();
    let req_out = tx.clone();
    let req_conn = handle.clone();
    let request_handle = tokio::spawn(async move {
        while let Some(text) = req_rx.recv().await {
            protocol::handle_text_message(text.as_str(), &req_conn, &req_out, &req_state).await;
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let msg = tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %handle.id,
                    "connection evicted by the hub"
                );
                break;
            }
            msg = ws_receiver.next() => msg,
        };
        match msg {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    // The request task may be blocked on a slow store; a
                    // full backlog bounces the request instead of stalling
                    // pong handling here.
                    if req_tx.try_send(text).is_err() {
                        protocol::send_error(&tx, "", 503, "Request backlog full, slow down");
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user_id,
                        "Received binary message (expected JSON text), ignoring"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.try_send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort helper tasks
    writer_handle.abort();
    ping_handle.abort();
    request_handle.abort();

    // Remove from the registry; the registry enqueues an Offline transition
    // only if this was the user's last connection. A no-op if the bus
    // already evicted this connection.
    state.registry.remove(&handle);

    tracing::info!(
        user_id = %user_id,
        connection_id = %handle.id,
        "WebSocket actor stopped"
    );
}

/// Writer task: drains the outbound queue into the WebSocket sink. A write
/// that fails or stalls past the timeout ends the task; queued events for
/// the dead connection are discarded, never replayed.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    write_timeout: Duration,
) {
    while let Some(msg) = rx.recv().await {
        match timeout(write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break,
            Err(_) => {
                tracing::warn!("transport write stalled past timeout, dropping connection");
                break;
            }
        }
    }
}
