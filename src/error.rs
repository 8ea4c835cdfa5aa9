use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Hub error taxonomy.
///
/// Validation and persistence errors are returned synchronously to the
/// caller of `Submit`/`NotifyLike`. Connection-liveness errors are handled
/// internally and never fail the caller's request: once a message is
/// persisted, live delivery is best-effort.
#[derive(Debug, Error)]
pub enum HubError {
    /// Registry is full. The client must retry with backoff.
    #[error("connection capacity exhausted")]
    Capacity,

    /// Message body is empty after trimming. No side effect occurred.
    #[error("message body is empty")]
    EmptyMessage,

    /// The external store rejected the write. No delivery was attempted;
    /// the caller may retry the whole submit.
    #[error("persistence rejected the write: {0}")]
    PersistenceFailed(String),

    /// A connection's outbound queue stalled or its writer died. Triggers
    /// forced removal; never surfaced to a message sender.
    #[error("connection is dead")]
    DeadConnection,

    /// Identity token missing, expired, or invalid.
    #[error("identity token rejected")]
    Unauthorized,

    #[error("internal hub error: {0}")]
    Internal(String),
}

impl HubError {
    /// Numeric code carried in WebSocket error envelopes.
    pub fn code(&self) -> u16 {
        match self {
            HubError::Capacity => 503,
            HubError::EmptyMessage => 422,
            HubError::PersistenceFailed(_) => 502,
            HubError::DeadConnection => 500,
            HubError::Unauthorized => 401,
            HubError::Internal(_) => 500,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            HubError::Capacity => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            HubError::EmptyMessage => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            HubError::PersistenceFailed(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            HubError::DeadConnection | HubError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal hub error".to_string(),
            ),
            HubError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
