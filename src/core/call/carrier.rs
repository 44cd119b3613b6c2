//! Instructions sent to the carrier gateway.
//!
//! The carrier owns the phone leg. When routing decides a call is forwarded
//! or sent to voicemail, or when a call is ended locally, the gateway is told
//! through this trait. `HttpCarrierControl` posts JSON instructions to
//! `{url}/calls/{call_sid}/{action}`; without a configured gateway,
//! `LoggingCarrierControl` only logs them.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::diagnostics::ErrorCategory;

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("Carrier request failed: {0}")]
    Request(String),

    #[error("Carrier rejected {action}: {status}")]
    Rejected { action: String, status: u16 },
}

impl CarrierError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Carrier
    }
}

pub type CarrierResult<T> = Result<T, CarrierError>;

/// Identifies the carrier leg of a call.
#[derive(Debug, Clone, Copy)]
pub struct CarrierLeg<'a> {
    pub call_id: &'a str,
    pub call_sid: &'a str,
}

#[async_trait]
pub trait CarrierControl: Send + Sync {
    /// Transfer the call to `target`.
    async fn forward(&self, leg: CarrierLeg<'_>, target: &str) -> CarrierResult<()>;

    /// Hand the call to the carrier's voicemail, optionally with a greeting.
    async fn voicemail(&self, leg: CarrierLeg<'_>, greeting: Option<&str>) -> CarrierResult<()>;

    /// Hang up the call.
    async fn hangup(&self, leg: CarrierLeg<'_>) -> CarrierResult<()>;
}

/// Carrier gateway reached over HTTP.
pub struct HttpCarrierControl {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCarrierControl {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    async fn post(
        &self,
        leg: CarrierLeg<'_>,
        action: &str,
        body: serde_json::Value,
    ) -> CarrierResult<()> {
        let url = format!("{}/calls/{}/{}", self.url, leg.call_sid, action);
        debug!(call_id = %leg.call_id, url = %url, "Carrier instruction");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CarrierError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CarrierError::Rejected {
                action: action.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CarrierControl for HttpCarrierControl {
    async fn forward(&self, leg: CarrierLeg<'_>, target: &str) -> CarrierResult<()> {
        self.post(
            leg,
            "forward",
            json!({ "call_id": leg.call_id, "target": target }),
        )
        .await
    }

    async fn voicemail(&self, leg: CarrierLeg<'_>, greeting: Option<&str>) -> CarrierResult<()> {
        self.post(
            leg,
            "voicemail",
            json!({ "call_id": leg.call_id, "greeting": greeting }),
        )
        .await
    }

    async fn hangup(&self, leg: CarrierLeg<'_>) -> CarrierResult<()> {
        self.post(leg, "hangup", json!({ "call_id": leg.call_id }))
            .await
    }
}

/// Used when no carrier gateway is configured.
#[derive(Debug, Default)]
pub struct LoggingCarrierControl;

#[async_trait]
impl CarrierControl for LoggingCarrierControl {
    async fn forward(&self, leg: CarrierLeg<'_>, target: &str) -> CarrierResult<()> {
        info!(call_id = %leg.call_id, target = %target, "Carrier: forward call");
        Ok(())
    }

    async fn voicemail(&self, leg: CarrierLeg<'_>, greeting: Option<&str>) -> CarrierResult<()> {
        info!(call_id = %leg.call_id, greeting = ?greeting, "Carrier: take voicemail");
        Ok(())
    }

    async fn hangup(&self, leg: CarrierLeg<'_>) -> CarrierResult<()> {
        info!(call_id = %leg.call_id, "Carrier: hang up");
        Ok(())
    }
}
