//! Hub event bus: the single enqueue path onto per-connection outbound
//! queues.
//!
//! Components never write to the underlying transport; they enqueue a typed
//! frame here and the connection's writer task drains it. The frame is
//! serialized once and the resulting text message cloned per connection, so
//! per-connection delivery order is exactly enqueue order.

use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::HubError;
use crate::events::ServerFrame;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Enqueue `frame` onto every live connection of `user_id`, skipping the
/// originating connection if given.
///
/// A single enqueue attempt per connection: a full queue means the client
/// has stalled past its bounded backlog and is treated like a write
/// failure. The connection is force-removed (the registry enqueues any
/// resulting offline transition itself) and its actor is signalled to shut
/// down, closing the socket so the client reconnects. No event replay is
/// attempted.
pub fn deliver_to_user(
    registry: &ConnectionRegistry,
    user_id: &str,
    origin: Option<Uuid>,
    frame: &ServerFrame,
) {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize outbound frame");
            return;
        }
    };
    let msg = Message::Text(text.into());

    for conn in registry.connections_of_except(user_id, origin) {
        match conn.tx.try_send(msg.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    user_id = %user_id,
                    connection_id = %conn.id,
                    error = %HubError::DeadConnection,
                    "outbound queue stalled or writer gone, evicting connection"
                );
                let handle = ConnectionHandle {
                    id: conn.id,
                    user_id: user_id.to_string(),
                };
                registry.remove(&handle);
                conn.shutdown.notify_one();
            }
        }
    }
}
