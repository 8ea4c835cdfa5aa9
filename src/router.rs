//! Message router: per-conversation ordered submit, persist, and fanout.
//!
//! All submissions for the same conversation flow through one lane — a
//! dedicated worker task draining an mpsc queue — so concurrent submissions
//! from both participants cannot interleave out of submission order as seen
//! by any recipient connection. Lanes are a fixed pool selected by hashing
//! the canonical conversation key, which bounds resource usage no matter
//! how many conversations are active.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::bus;
use crate::error::HubError;
use crate::events::{ChatMessage, ServerFrame, ServerPayload};
use crate::identity::Identity;
use crate::persist::PersistClient;
use crate::registry::ConnectionRegistry;
use crate::state::AppState;

/// Canonical identifier for the unordered pair of participants in a direct
/// message thread. Both participants resolve to the same key regardless of
/// who is sender or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    first: String,
    second: String,
}

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                first: a.to_string(),
                second: b.to_string(),
            }
        } else {
            Self {
                first: b.to_string(),
                second: a.to_string(),
            }
        }
    }

    /// Wire form: "lower:higher".
    pub fn as_string(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }

    /// Stable lane selection for a pool of `lanes` workers.
    pub fn lane_index(&self, lanes: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % lanes.max(1)
    }
}

struct LaneJob {
    key: ConversationKey,
    sender_id: String,
    recipient_id: String,
    body: String,
    origin: Option<Uuid>,
    reply: oneshot::Sender<Result<ChatMessage, HubError>>,
}

/// Cloneable handle over the lane pool.
#[derive(Clone)]
pub struct MessageRouter {
    lanes: Arc<Vec<mpsc::Sender<LaneJob>>>,
}

impl MessageRouter {
    /// Spawn `lane_count` worker tasks, each with a queue of `lane_depth`.
    pub fn spawn(
        lane_count: usize,
        lane_depth: usize,
        persist: Arc<dyn PersistClient>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let mut lanes = Vec::with_capacity(lane_count.max(1));
        for _ in 0..lane_count.max(1) {
            let (tx, rx) = mpsc::channel(lane_depth.max(1));
            tokio::spawn(lane_worker(rx, persist.clone(), registry.clone()));
            lanes.push(tx);
        }
        Self {
            lanes: Arc::new(lanes),
        }
    }

    /// Submit a direct message.
    ///
    /// Validation happens before anything else, so an empty body causes no
    /// persistence call and no delivery. Self-messages are allowed. On
    /// persistence success the message is fanned out to the recipient's
    /// connections and the sender's other connections; the persisted
    /// message is returned regardless of whether anyone was live to
    /// receive it.
    pub async fn submit(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        origin: Option<Uuid>,
    ) -> Result<ChatMessage, HubError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(HubError::EmptyMessage);
        }

        let key = ConversationKey::new(sender_id, recipient_id);
        let lane = &self.lanes[key.lane_index(self.lanes.len())];

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = LaneJob {
            key,
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            origin,
            reply: reply_tx,
        };

        lane.send(job)
            .await
            .map_err(|_| HubError::Internal("conversation lane is gone".to_string()))?;

        reply_rx
            .await
            .map_err(|_| HubError::Internal("conversation lane dropped the reply".to_string()))?
    }
}

async fn lane_worker(
    mut rx: mpsc::Receiver<LaneJob>,
    persist: Arc<dyn PersistClient>,
    registry: Arc<ConnectionRegistry>,
) {
    while let Some(job) = rx.recv().await {
        let persisted = match persist
            .create_message(&job.sender_id, &job.recipient_id, &job.body)
            .await
        {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!(
                    sender_id = %job.sender_id,
                    recipient_id = %job.recipient_id,
                    error = %e,
                    "persistence rejected submit, no delivery attempted"
                );
                let _ = job
                    .reply
                    .send(Err(HubError::PersistenceFailed(e.to_string())));
                continue;
            }
        };

        let message = ChatMessage {
            id: persisted.id,
            conversation_key: job.key.as_string(),
            sender_id: job.sender_id.clone(),
            body: job.body,
            created_at: persisted.created_at,
        };

        let frame = ServerFrame::event(ServerPayload::Message(message.clone()));

        // Recipient fanout, then sender echo to their other tabs. For a
        // self-message the two sets coincide; deliver once, still skipping
        // the originating connection (it gets the ack instead).
        if job.sender_id == job.recipient_id {
            bus::deliver_to_user(&registry, &job.recipient_id, job.origin, &frame);
        } else {
            bus::deliver_to_user(&registry, &job.recipient_id, None, &frame);
            bus::deliver_to_user(&registry, &job.sender_id, job.origin, &frame);
        }

        tracing::debug!(
            message_id = %message.id,
            conversation_key = %message.conversation_key,
            "message persisted and fanned out"
        );

        let _ = job.reply.send(Ok(message));
    }
}

// --- REST endpoint handler ---

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub recipient_id: String,
    pub body: String,
    /// A client submitting over REST can name its own WebSocket connection
    /// so that connection is excluded from the sender echo.
    #[serde(default)]
    pub origin_connection_id: Option<Uuid>,
}

/// POST /api/messages — submit a direct message. Identity token required.
pub async fn submit_message(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), HubError> {
    let message = state
        .router
        .submit(
            &identity.user_id,
            &body.recipient_id,
            &body.body,
            body.origin_connection_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
