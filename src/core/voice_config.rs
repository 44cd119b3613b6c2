//! Voice identity and synthesis model, fetched from the backend and cached.
//!
//! The backend exposes `GET {base}/voice-config` returning
//! `{ "voice_id": "...", "model": "..." }`. Results are cached for a TTL; when
//! the backend is unreachable (or not configured) the configured defaults are
//! used so speech never blocks on this lookup.

use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};

const CACHE_KEY: &str = "voice-config";

/// Voice settings applied to agent speech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Voice config cache settings.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Backend base URL; `None` disables remote lookup
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    /// Settings used when the backend cannot be reached
    pub defaults: VoiceSettings,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            defaults: VoiceSettings::default(),
            cache_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// TTL cache in front of the backend voice configuration.
pub struct VoiceConfigCache {
    config: VoiceConfig,
    client: reqwest::Client,
    cache: Cache<&'static str, VoiceSettings>,
}

impl VoiceConfigCache {
    pub fn new(config: VoiceConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.cache_ttl)
            .build();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            cache,
        }
    }

    /// Current voice settings. Served from cache when fresh, otherwise
    /// fetched; falls back to defaults on any failure (not cached, so the
    /// next call retries).
    pub async fn get(&self) -> VoiceSettings {
        if let Some(settings) = self.cache.get(CACHE_KEY).await {
            return settings;
        }

        match self.fetch().await {
            Ok(Some(settings)) => {
                self.cache.insert(CACHE_KEY, settings.clone()).await;
                settings
            }
            Ok(None) => self.config.defaults.clone(),
            Err(e) => {
                tracing::warn!("Voice config lookup failed, using defaults: {}", e);
                self.config.defaults.clone()
            }
        }
    }

    /// Drop the cached value and fetch again.
    pub async fn refresh(&self) -> VoiceSettings {
        self.cache.invalidate(CACHE_KEY).await;
        self.get().await
    }

    async fn fetch(&self) -> Result<Option<VoiceSettings>, reqwest::Error> {
        let Some(base) = self.config.backend_url.as_deref() else {
            return Ok(None);
        };

        let url = format!("{}/voice-config", base.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let fetched: VoiceSettings = request.send().await?.error_for_status()?.json().await?;

        // Missing fields fall back to the configured defaults
        Ok(Some(VoiceSettings {
            voice_id: fetched.voice_id.or_else(|| self.config.defaults.voice_id.clone()),
            model: fetched.model.or_else(|| self.config.defaults.model.clone()),
        }))
    }
}
