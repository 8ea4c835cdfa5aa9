//! Dispatch for client request envelopes arriving over a WebSocket.

use axum::extract::ws::Message;

use crate::events::{ClientEnvelope, ClientRequest, ServerFrame, ServerPayload};
use crate::registry::ConnectionHandle;
use crate::state::AppState;
use crate::ws::ConnectionSender;

/// Handle an incoming text (JSON) message: decode the envelope, dispatch
/// by request type, send the response frame with the echoed request id.
pub async fn handle_text_message(
    text: &str,
    conn: &ConnectionHandle,
    tx: &ConnectionSender,
    state: &AppState,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                user_id = %conn.user_id,
                error = %e,
                "Failed to decode request envelope"
            );
            send_error(tx, "", 400, "Invalid request envelope");
            return;
        }
    };

    let request_id = envelope.request_id;

    match envelope.request {
        ClientRequest::Submit {
            recipient_id,
            body,
        } => {
            // The submitting connection is the origin: it gets this ack,
            // not a message echo.
            match state
                .router
                .submit(&conn.user_id, &recipient_id, &body, Some(conn.id))
                .await
            {
                Ok(message) => send_frame(
                    tx,
                    &ServerFrame::response(&request_id, ServerPayload::SubmitAck { message }),
                ),
                Err(err) => send_error(tx, &request_id, err.code(), &err.to_string()),
            }
        }
        ClientRequest::SubscribePresence { target_id } => {
            state.presence.subscribe(&conn.user_id, &target_id);
            let is_online = state.registry.is_online(&target_id);
            send_frame(
                tx,
                &ServerFrame::response(
                    &request_id,
                    ServerPayload::SubscribeAck {
                        target_id,
                        is_online,
                    },
                ),
            );
        }
        ClientRequest::UnsubscribePresence { target_id } => {
            state.presence.unsubscribe(&conn.user_id, &target_id);
            send_frame(tx, &ServerFrame::response(&request_id, ServerPayload::Ack));
        }
    }
}

/// Encode and enqueue a frame on this connection's outbound queue. A full
/// queue drops the frame; the connection is on its way out anyway.
fn send_frame(tx: &ConnectionSender, frame: &ServerFrame) {
    if let Ok(text) = serde_json::to_string(frame) {
        let _ = tx.try_send(Message::Text(text.into()));
    }
}

/// Send an error response frame.
pub(crate) fn send_error(tx: &ConnectionSender, request_id: &str, code: u16, message: &str) {
    send_frame(
        tx,
        &ServerFrame::response(
            request_id,
            ServerPayload::Error {
                code,
                message: message.to_string(),
            },
        ),
    );
}
