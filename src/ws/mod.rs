pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Sender half of a connection's bounded outbound queue. Components clone
/// this (via the registry) to push frames to a specific client; only the
/// connection's writer task touches the transport.
pub type ConnectionSender = mpsc::Sender<axum::extract::ws::Message>;
