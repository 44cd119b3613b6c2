//! Client for the backend that stores call records.
//!
//! Writes are best-effort: the call manager dispatches them on background
//! tasks and only logs failures, so a slow or unavailable backend never
//! blocks or fails a call.
//!
//! # API
//!
//! - `POST {base}/calls` with the call snapshot
//! - `POST {base}/calls/{call_id}/messages` with one message

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::call::{Call, Message};
use crate::core::diagnostics::ErrorCategory;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence request failed: {0}")]
    Request(String),

    #[error("Persistence backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl PersistenceError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Connection
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn save_call(&self, call: &Call) -> PersistenceResult<()>;

    async fn save_message(&self, message: &Message) -> PersistenceResult<()>;
}

/// Backend persistence over HTTP.
pub struct HttpCallRecordStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCallRecordStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> PersistenceResult<()> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CallRecordStore for HttpCallRecordStore {
    async fn save_call(&self, call: &Call) -> PersistenceResult<()> {
        self.post("/calls", call).await
    }

    async fn save_message(&self, message: &Message) -> PersistenceResult<()> {
        self.post(&format!("/calls/{}/messages", message.call_id), message)
            .await
    }
}

/// Discards every write. Used when no backend is configured.
#[derive(Debug, Default)]
pub struct NoopCallRecordStore;

#[async_trait]
impl CallRecordStore for NoopCallRecordStore {
    async fn save_call(&self, _call: &Call) -> PersistenceResult<()> {
        Ok(())
    }

    async fn save_message(&self, _message: &Message) -> PersistenceResult<()> {
        Ok(())
    }
}
