//! Configuration module for the telephony server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//! The configuration is split into logical submodules for maintainability.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use waav_telephony::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::audio::AudioConfig;
use crate::core::call::CallConfig;
use crate::core::diagnostics::{DiagnosticsConfig, ErrorCategory};
use crate::core::routing::{Router, RoutingError, RoutingRule};
use crate::core::speech::{HttpSynthesizerConfig, SpeechConfig};
use crate::core::transport::TransportConfig;
use crate::core::voice_config::VoiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid routing rules: {0}")]
    Routing(#[from] RoutingError),
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Backend persistence and voice-config collaborator
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL; when unset, call records are not persisted
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Carrier gateway that receives forward/voicemail/hangup instructions
#[derive(Debug, Clone)]
pub struct CarrierConfig {
    /// When unset, instructions are only logged
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingConfig {
    /// Offset from UTC that time windows and days are evaluated in
    pub utc_offset_minutes: i32,
    pub rules: Vec<RoutingRule>,
}

/// Server configuration
///
/// Contains all configuration needed to run the telephony server, including:
/// - Server settings (host, port, TLS, CORS)
/// - Backend speech service stream and its reconnection policy
/// - Speech coordination timings and language thresholds
/// - Persistence, voice config, carrier and synthesizer collaborators
/// - Audio, call lifecycle and diagnostics settings
/// - Routing rules
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    /// Backend speech service stream (URL, timeouts, reconnection)
    pub transport: TransportConfig,
    pub speech: SpeechConfig,
    /// Local synthesizer for long-form chunks; when unset, chunks are sent
    /// to the backend speech service
    pub synthesizer: Option<HttpSynthesizerConfig>,
    pub audio: AudioConfig,
    pub call: CallConfig,
    pub backend: BackendConfig,
    pub carrier: CarrierConfig,
    pub voice: VoiceConfig,
    pub diagnostics: DiagnosticsConfig,
    pub routing: RoutingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            cors_allowed_origins: None,
            transport: TransportConfig::default(),
            speech: SpeechConfig::default(),
            synthesizer: None,
            audio: AudioConfig::default(),
            call: CallConfig::default(),
            backend: BackendConfig::default(),
            carrier: CarrierConfig::default(),
            voice: VoiceConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
/// This ensures sensitive data is cleared from memory immediately after use.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.speech.service_token.zeroize();
        if let Some(ref mut synthesizer) = self.synthesizer
            && let Some(ref mut key) = synthesizer.api_key
        {
            key.zeroize();
        }
        if let Some(ref mut key) = self.backend.api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.carrier.api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.voice.api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads every setting from the environment (after `.env` has been loaded
    /// by the binary), falling back to defaults, then validates the result.
    pub fn from_env() -> ConfigResult<Self> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> ConfigResult<Self> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Build the routing table from the configured rules.
    pub fn router(&self) -> Result<Router, RoutingError> {
        Router::new(self.routing.rules.clone(), self.routing.utc_offset_minutes)
    }
}
