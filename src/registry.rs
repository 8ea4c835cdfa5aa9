//! Connection registry: tracks all active WebSocket connections per user.
//!
//! A user can have multiple concurrent connections (multiple devices/tabs),
//! so entries are set-valued. A user is online iff their connection set is
//! non-empty. The empty/non-empty derivation AND the enqueue onto the
//! presence tracker's channel both happen inside the same map-entry
//! critical section, so transitions for a user land on the channel in
//! occurrence order and two connections closing simultaneously produce
//! exactly one offline transition.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::error::HubError;
use crate::ws::ConnectionSender;

/// One live connection: its instance id, the sender half of its outbound
/// queue, and the signal that tells its actor to shut down on eviction.
/// Cloning is cheap (sender and signal are reference-counted).
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub tx: ConnectionSender,
    pub shutdown: Arc<Notify>,
}

/// Handle returned by `admit`, used for (idempotent) removal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
}

/// Presence transition produced atomically by admit/remove and consumed by
/// the presence tracker's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    Online(String),
    Offline(String),
}

/// Registry of live connections keyed by user id.
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<Connection>>,
    /// Presence tracker channel. Sends are non-blocking, so enqueuing
    /// while the entry guard is held cannot stall the registry.
    transitions: mpsc::UnboundedSender<PresenceTransition>,
    total: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(
        max_connections: usize,
        transitions: mpsc::UnboundedSender<PresenceTransition>,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            transitions,
            total: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Register a new live connection under `user_id`.
    ///
    /// Fails only on capacity exhaustion. If this is the user's first
    /// connection, the `Online` transition is enqueued for the presence
    /// tracker before the entry guard is released.
    pub fn admit(
        &self,
        user_id: &str,
        tx: ConnectionSender,
        shutdown: Arc<Notify>,
    ) -> Result<ConnectionHandle, HubError> {
        self.total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .map_err(|_| HubError::Capacity)?;

        let id = Uuid::new_v4();
        {
            let mut entry = self.connections.entry(user_id.to_string()).or_default();
            if entry.is_empty() {
                let _ = self
                    .transitions
                    .send(PresenceTransition::Online(user_id.to_string()));
            }
            entry.push(Connection { id, tx, shutdown });
        }

        Ok(ConnectionHandle {
            id,
            user_id: user_id.to_string(),
        })
    }

    /// Deregister a connection. Removing an already-removed handle is a
    /// no-op. If this was the user's last connection, the single `Offline`
    /// transition is enqueued while the entry guard is still held.
    pub fn remove(&self, handle: &ConnectionHandle) {
        let mut removed = false;

        if let Some(mut entry) = self.connections.get_mut(&handle.user_id) {
            let before = entry.len();
            entry.retain(|conn| conn.id != handle.id);
            removed = entry.len() < before;
            if removed && entry.is_empty() {
                let _ = self
                    .transitions
                    .send(PresenceTransition::Offline(handle.user_id.clone()));
            }
        }

        if removed {
            self.total.fetch_sub(1, Ordering::SeqCst);
            // Drop the empty vec so online_users() stays a plain key scan.
            self.connections.remove_if(&handle.user_id, |_, v| v.is_empty());
        }
    }

    /// Snapshot of a user's live connections. The set may change immediately
    /// after this returns; no lock is held across use.
    pub fn connections_of(&self, user_id: &str) -> Vec<Connection> {
        self.connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot excluding one originating connection (sender-echo fanout).
    pub fn connections_of_except(&self, user_id: &str, origin: Option<Uuid>) -> Vec<Connection> {
        let mut conns = self.connections_of(user_id);
        if let Some(origin) = origin {
            conns.retain(|conn| conn.id != origin);
        }
        conns
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// All users with at least one live connection, for the snapshot pushed
    /// to a newly connected client.
    pub fn online_users(&self) -> Vec<String> {
        self.connections
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn total_connections(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
