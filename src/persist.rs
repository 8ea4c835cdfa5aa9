//! Client for the external persistence collaborator.
//!
//! The hub owns no durable state. Messages are persisted through this
//! REST-style service before any live delivery happens; likes are recorded
//! by the service's own request handler, which then tells the hub the
//! result via `NotifyLike`. The trait boundary lets integration tests
//! inject a mock store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence service unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Authoritative fields assigned by the store on message creation.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistClient: Send + Sync {
    /// Durably store a direct message. Called from a conversation lane;
    /// this is the only external call the hub blocks on.
    async fn create_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> Result<PersistedMessage, PersistError>;
}

/// reqwest-backed client against the persistence service's REST API.
pub struct HttpPersistClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPersistClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl PersistClient for HttpPersistClient {
    async fn create_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> Result<PersistedMessage, PersistError> {
        let url = format!("{}/api/v1/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "sender_id": sender_id,
                "recipient_id": recipient_id,
                "body": body,
            }))
            .send()
            .await
            .map_err(|e| PersistError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PersistError::NotFound(format!(
                "recipient {} unknown to store",
                recipient_id
            )));
        }
        if !status.is_success() {
            return Err(PersistError::Unavailable(format!(
                "store returned {}",
                status
            )));
        }

        response
            .json::<PersistedMessage>()
            .await
            .map_err(|e| PersistError::Unavailable(e.to_string()))
    }
}
