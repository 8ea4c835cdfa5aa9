use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::persist::PersistClient;
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Per-connection delivery limits, from config.
#[derive(Debug, Clone)]
pub struct HubLimits {
    pub queue_depth: usize,
    pub write_timeout: Duration,
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connections per user
    pub registry: Arc<ConnectionRegistry>,
    /// Presence delta dispatch
    pub presence: PresenceTracker,
    /// Conversation-ordered message submission
    pub router: MessageRouter,
    /// Shared secret for identity token verification
    pub identity_secret: Vec<u8>,
    pub limits: HubLimits,
}

/// Wire the hub components together. Used by main and by the integration
/// tests, which pass a mock persistence client.
pub fn build_state(
    config: &Config,
    persist: Arc<dyn PersistClient>,
    identity_secret: Vec<u8>,
) -> AppState {
    // The registry owns the send half of the transition channel so
    // transitions are enqueued inside its critical section; the tracker's
    // dispatcher drains the other end.
    let (transition_tx, transition_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(ConnectionRegistry::new(config.max_connections, transition_tx));
    let presence = PresenceTracker::spawn(registry.clone(), transition_rx);
    let router = MessageRouter::spawn(
        config.conversation_lanes,
        config.lane_depth,
        persist,
        registry.clone(),
    );

    AppState {
        registry,
        presence,
        router,
        identity_secret,
        limits: HubLimits {
            queue_depth: config.connection_queue_depth,
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        },
    }
}
