use serde::Deserialize;
use std::path::PathBuf;

use super::{ConfigError, ConfigResult};
use crate::core::routing::RoutingRule;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values present here override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   cors_allowed_origins: "*"
///
/// speech:
///   service_url: "wss://speech.example.com/stream"
///   service_token: "token"
///   model: "nova-2"
///   default_language: "en"
///   switch_confidence: 0.7
///   lock_confidence: 0.85
///   capture_resume_delay_ms: 600
///
/// transport:
///   connect_timeout_seconds: 10
///   heartbeat_interval_seconds: 30
///   reconnect:
///     max_attempts: 5
///     initial_delay_ms: 1000
///
/// backend:
///   url: "https://api.example.com"
///   api_key: "backend-key"
///
/// carrier:
///   url: "https://carrier-gateway.example.com"
///
/// audio:
///   codec: "mulaw"
///   silence_threshold: 0.01
///
/// call:
///   welcome_message: "Thanks for calling, how can we help?"
///
/// routing:
///   utc_offset_minutes: -300
///   rules:
///     - name: "after-hours"
///       priority: 10
///       conditions:
///         time_window: { start: "18:00", end: "08:00" }
///       action:
///         type: voicemail
///         message: "We are closed. Please leave a message."
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub speech: Option<SpeechYaml>,
    pub transport: Option<TransportYaml>,
    pub tts: Option<TtsYaml>,
    pub backend: Option<BackendYaml>,
    pub carrier: Option<CarrierYaml>,
    pub audio: Option<AudioYaml>,
    pub call: Option<CallYaml>,
    pub voice: Option<VoiceYaml>,
    pub diagnostics: Option<DiagnosticsYaml>,
    pub routing: Option<RoutingYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
    pub cors_allowed_origins: Option<String>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Backend speech service and coordination settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    pub service_url: Option<String>,
    pub service_token: Option<String>,
    pub model: Option<String>,
    pub default_language: Option<String>,
    pub switch_confidence: Option<f32>,
    pub lock_confidence: Option<f32>,
    pub auto_lock: Option<bool>,
    pub capture_resume_delay_ms: Option<u64>,
    pub chunk_pause_ms: Option<u64>,
    pub chunk_max_retries: Option<u32>,
    pub chunk_playback_timeout_ms: Option<u64>,
    pub max_chunk_chars: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
}

/// Transport channel settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TransportYaml {
    pub connect_timeout_seconds: Option<u64>,
    pub heartbeat_interval_seconds: Option<u64>,
    pub reconnect: Option<ReconnectYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReconnectYaml {
    pub enabled: Option<bool>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f32>,
    pub jitter: Option<bool>,
}

/// Long-form synthesizer from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub sample_rate: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Persistence / voice-config backend from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Carrier gateway from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CarrierYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Audio bridge settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub silence_threshold: Option<f32>,
    pub hangover_frames: Option<u32>,
    pub frame_duration_ms: Option<u32>,
}

/// Call lifecycle settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallYaml {
    pub terminal_grace_seconds: Option<u64>,
    pub retention_hours: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
    pub welcome_message: Option<String>,
    pub agent_name: Option<String>,
    pub customer_name: Option<String>,
}

/// Voice defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub voice_id: Option<String>,
    pub model: Option<String>,
    pub cache_ttl_seconds: Option<u64>,
}

/// Diagnostics recorder settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DiagnosticsYaml {
    pub max_errors: Option<usize>,
    pub max_logs: Option<usize>,
    pub auto_resolve_minutes: Option<u64>,
    pub retention_minutes: Option<u64>,
    pub health_window_minutes: Option<u64>,
    pub unhealthy_high_threshold: Option<usize>,
    pub degraded_volume_threshold: Option<usize>,
}

/// Routing rules from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoutingYaml {
    pub utc_offset_minutes: Option<i32>,
    pub rules: Option<Vec<RoutingRule>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
