//! Typed events and wire envelopes.
//!
//! Every payload the hub pushes to a live connection is one of the variants
//! below, wrapped in a `ServerFrame` and serialized as JSON text. Requests
//! arriving over a WebSocket carry a `request_id` that is echoed back on the
//! response frame so clients can correlate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence change for a single user. Ephemeral; consumed once by
/// subscribers, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceDelta {
    pub user_id: String,
    pub is_online: bool,
    pub timestamp: DateTime<Utc>,
}

/// A direct message after the persistence collaborator has accepted it.
/// `id` and `created_at` are authoritative, assigned by the store.
/// The hub never mutates a message after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A like recorded by the persistence collaborator. The hub only routes it
/// to the post author's live connections; duplicates are acceptable because
/// clients reconcile by the authoritative count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeEvent {
    pub post_id: String,
    pub post_author_id: String,
    pub liker_id: String,
    pub like_count: u64,
}

/// Server-to-client payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    /// Presence change pushed to subscribed observers.
    Presence(PresenceDelta),
    /// Complete online-user set, pushed once when a connection is admitted.
    /// One frame regardless of how many users are online.
    PresenceSnapshot { online_users: Vec<String> },
    /// A chat message delivered to recipient and sender-echo connections.
    Message(ChatMessage),
    /// A like notification for a post the receiving user authored.
    Like(LikeEvent),
    /// Response to a `submit` request: the persisted message.
    SubmitAck { message: ChatMessage },
    /// Response to `subscribe_presence`, carrying the target's current state.
    SubscribeAck { target_id: String, is_online: bool },
    /// Generic success response for requests with no payload.
    Ack,
    /// Error response for a failed request.
    Error { code: u16, message: String },
}

/// Outbound frame: optional request correlation id plus payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(flatten)]
    pub payload: ServerPayload,
}

impl ServerFrame {
    /// Frame for an unsolicited event (no request correlation).
    pub fn event(payload: ServerPayload) -> Self {
        Self {
            request_id: String::new(),
            payload,
        }
    }

    /// Frame responding to a client request.
    pub fn response(request_id: &str, payload: ServerPayload) -> Self {
        Self {
            request_id: request_id.to_string(),
            payload,
        }
    }
}

/// Client-to-server requests over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Submit a direct message. Responds with `SubmitAck` or `Error`.
    Submit { recipient_id: String, body: String },
    /// Register interest in a user's presence changes.
    SubscribePresence { target_id: String },
    /// Remove interest in a user's presence changes.
    UnsubscribePresence { target_id: String },
}

/// Inbound frame: correlation id plus request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub request_id: String,
    #[serde(flatten)]
    pub request: ClientRequest,
}
