//! HTTP text-to-speech collaborator used for long-form chunks.
//!
//! # API
//!
//! - Endpoint: `POST {url}`
//! - Body: `{ "text", "language", "voice_id"?, "model"?, "encoding": "linear16", "sample_rate" }`
//! - Response: raw 16-bit little-endian PCM

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use super::base::{SpeechError, SpeechResult, SpeechSynthesizer, SynthesisRequest};

#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub sample_rate: u32,
    pub timeout: Duration,
}

pub struct HttpSynthesizer {
    config: HttpSynthesizerConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: HttpSynthesizerConfig) -> SpeechResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::SynthesisFailed(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn build_http_request(&self, request: &SynthesisRequest) -> reqwest::RequestBuilder {
        let mut body = json!({
            "text": request.text,
            "language": request.language,
            "encoding": "linear16",
            "sample_rate": self.config.sample_rate,
        });
        if let Some(voice) = &request.voice_id {
            body["voice_id"] = json!(voice);
        }
        if let Some(model) = &request.model {
            body["model"] = json!(model);
        }

        let mut builder = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> SpeechResult<Bytes> {
        let response = self
            .build_http_request(&request)
            .send()
            .await
            .map_err(|e| SpeechError::SynthesisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::SynthesisFailed(format!(
                "synthesizer returned {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::SynthesisFailed(e.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::SynthesisFailed(
                "synthesizer returned no audio".to_string(),
            ));
        }
        Ok(audio)
    }
}
