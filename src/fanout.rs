//! Like-notification fanout.
//!
//! The persistence service's request handler records the like and then
//! tells the hub the result. If the post author has no live connections
//! the event is dropped — presence-only semantics, no backlog. Duplicate
//! delivery is acceptable: clients reconcile by the authoritative count,
//! not by accumulating deltas.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::bus;
use crate::events::{LikeEvent, ServerFrame, ServerPayload};
use crate::state::AppState;

/// Push a like event to every live connection of the post author.
/// Deliberate no-op when the author is offline.
pub fn notify_like(state: &AppState, like: LikeEvent) {
    let author_id = like.post_author_id.clone();

    if !state.registry.is_online(&author_id) {
        tracing::debug!(
            post_id = %like.post_id,
            post_author_id = %author_id,
            "like event dropped, author has no live connections"
        );
        return;
    }

    let frame = ServerFrame::event(ServerPayload::Like(like));
    bus::deliver_to_user(&state.registry, &author_id, None, &frame);
}

#[derive(Debug, Deserialize)]
pub struct NotifyLikeRequest {
    pub post_id: String,
    pub post_author_id: String,
    pub liker_id: String,
    pub like_count: u64,
}

/// POST /api/hub/notify-like — invoked by the persistence service's like
/// handler, not by end-user clients.
pub async fn notify_like_handler(
    State(state): State<AppState>,
    Json(body): Json<NotifyLikeRequest>,
) -> StatusCode {
    notify_like(
        &state,
        LikeEvent {
            post_id: body.post_id,
            post_author_id: body.post_author_id,
            liker_id: body.liker_id,
            like_count: body.like_count,
        },
    );
    StatusCode::ACCEPTED
}
