//! Presence tracker: turns registry transitions into `PresenceDelta` events
//! for interested observers.
//!
//! The registry enqueues transitions onto an unbounded channel inside its
//! own entry critical section, so the channel carries them in occurrence
//! order and the enqueue never blocks. A single dispatcher task drains the
//! channel and fans deltas out to each observer's live connections;
//! single-consumer dispatch keeps deltas for a given target user strictly
//! ordered.

use axum::extract::Path;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bus;
use crate::events::{PresenceDelta, ServerFrame, ServerPayload};
use crate::identity::Identity;
use crate::registry::{ConnectionRegistry, PresenceTransition};
use crate::state::AppState;

/// Cloneable handle to the presence subscription state.
#[derive(Clone)]
pub struct PresenceTracker {
    /// target user id -> observer user ids
    interests: Arc<DashMap<String, HashSet<String>>>,
}

impl PresenceTracker {
    /// Create the tracker and spawn its dispatcher task over the receive
    /// half of the registry's transition channel.
    pub fn spawn(
        registry: Arc<ConnectionRegistry>,
        transitions: mpsc::UnboundedReceiver<PresenceTransition>,
    ) -> Self {
        let interests: Arc<DashMap<String, HashSet<String>>> = Arc::new(DashMap::new());

        tokio::spawn(dispatch_loop(registry, interests.clone(), transitions));

        Self { interests }
    }

    /// Register `observer`'s interest in `target`'s presence changes.
    pub fn subscribe(&self, observer: &str, target: &str) {
        self.interests
            .entry(target.to_string())
            .or_default()
            .insert(observer.to_string());
    }

    pub fn unsubscribe(&self, observer: &str, target: &str) {
        if let Some(mut observers) = self.interests.get_mut(target) {
            observers.remove(observer);
        }
        self.interests.remove_if(target, |_, v| v.is_empty());
    }
}

async fn dispatch_loop(
    registry: Arc<ConnectionRegistry>,
    interests: Arc<DashMap<String, HashSet<String>>>,
    mut rx: mpsc::UnboundedReceiver<PresenceTransition>,
) {
    while let Some(transition) = rx.recv().await {
        let (user_id, is_online) = match transition {
            PresenceTransition::Online(user_id) => (user_id, true),
            PresenceTransition::Offline(user_id) => (user_id, false),
        };

        if !is_online {
            // A departed user no longer observes anyone.
            interests.retain(|_, observers| {
                observers.remove(&user_id);
                !observers.is_empty()
            });
        }

        tracing::debug!(user_id = %user_id, is_online, "presence transition");

        let frame = ServerFrame::event(ServerPayload::Presence(PresenceDelta {
            user_id: user_id.clone(),
            is_online,
            timestamp: Utc::now(),
        }));

        let observers: Vec<String> = interests
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        for observer in observers {
            // Eviction during delivery enqueues its own offline transition
            // onto this same channel, behind whatever is already queued.
            bus::deliver_to_user(&registry, &observer, None, &frame);
        }
    }
}

// --- REST endpoint handlers ---

#[derive(Debug, Serialize)]
pub struct PresenceSnapshot {
    pub online_users: Vec<String>,
}

/// GET /api/presence — all currently online users. Identity token required.
pub async fn get_presence(
    State(state): State<AppState>,
    _identity: Identity,
) -> Json<PresenceSnapshot> {
    Json(PresenceSnapshot {
        online_users: state.registry.online_users(),
    })
}

#[derive(Debug, Serialize)]
pub struct UserPresence {
    pub user_id: String,
    pub is_online: bool,
}

/// GET /api/presence/{user_id} — single-user presence query.
pub async fn get_user_presence(
    State(state): State<AppState>,
    _identity: Identity,
    Path(user_id): Path<String>,
) -> Json<UserPresence> {
    let is_online = state.registry.is_online(&user_id);
    Json(UserPresence { user_id, is_online })
}
