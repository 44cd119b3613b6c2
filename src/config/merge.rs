//! Merging YAML configuration over the environment.
//!
//! The environment provides the base configuration (see `env`); any value
//! present in the YAML file replaces it.

use std::path::PathBuf;

use super::env::load_from_env;
use super::utils::{millis, secs};
use super::yaml::YamlConfig;
use super::{ConfigError, ConfigResult, ServerConfig, TlsConfig};
use crate::core::speech::HttpSynthesizerConfig;

/// Merge YAML overrides onto the environment configuration.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> ConfigResult<ServerConfig> {
    let mut config = load_from_env()?;

    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }

    // The voice config lives on the same backend as persistence
    config.voice.backend_url = config.backend.url.clone();
    config.voice.api_key = config.backend.api_key.clone();
    config.voice.request_timeout = config.backend.timeout;

    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> ConfigResult<()> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(origins) = server.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(tls) = server.tls {
            match (tls.enabled, tls.cert_path, tls.key_path) {
                (Some(false), _, _) => config.tls = None,
                (_, Some(cert), Some(key)) => {
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert),
                        key_path: PathBuf::from(key),
                    })
                }
                (Some(true), _, _) => {
                    return Err(ConfigError::Invalid(
                        "server.tls requires cert_path and key_path".to_string(),
                    ));
                }
                _ => {}
            }
        }
    }

    if let Some(speech) = yaml.speech {
        let target = &mut config.speech;
        if let Some(url) = speech.service_url {
            config.transport.url = url;
        }
        if let Some(token) = speech.service_token {
            target.service_token = token;
        }
        if let Some(model) = speech.model {
            target.model = model;
        }
        if let Some(language) = speech.default_language {
            target.default_language = language;
        }
        if let Some(v) = speech.switch_confidence {
            target.language.switch_confidence = v;
        }
        if let Some(v) = speech.lock_confidence {
            target.language.lock_confidence = v;
        }
        if let Some(v) = speech.auto_lock {
            target.language.auto_lock = v;
        }
        if let Some(v) = speech.capture_resume_delay_ms {
            target.capture_resume_delay = millis(v);
        }
        if let Some(v) = speech.chunk_pause_ms {
            target.chunk_pause = millis(v);
        }
        if let Some(v) = speech.chunk_max_retries {
            target.chunk_max_retries = v;
        }
        if let Some(v) = speech.chunk_playback_timeout_ms {
            target.chunk_playback_timeout = millis(v);
        }
        if let Some(v) = speech.max_chunk_chars {
            target.max_chunk_chars = v;
        }
        if let Some(v) = speech.idle_timeout_seconds {
            target.idle_timeout = secs(v);
        }
    }

    if let Some(transport) = yaml.transport {
        if let Some(v) = transport.connect_timeout_seconds {
            config.transport.connect_timeout = secs(v);
        }
        if let Some(v) = transport.heartbeat_interval_seconds {
            config.transport.heartbeat_interval = secs(v);
        }
        if let Some(reconnect) = transport.reconnect {
            let target = &mut config.transport.reconnection;
            if let Some(v) = reconnect.enabled {
                target.enabled = v;
            }
            if let Some(v) = reconnect.max_attempts {
                target.max_attempts = v;
            }
            if let Some(v) = reconnect.initial_delay_ms {
                target.initial_delay_ms = v;
            }
            if let Some(v) = reconnect.max_delay_ms {
                target.max_delay_ms = v;
            }
            if let Some(v) = reconnect.backoff_multiplier {
                target.backoff_multiplier = v;
            }
            if let Some(v) = reconnect.jitter {
                target.jitter = v;
            }
        }
    }

    if let Some(tts) = yaml.tts
        && let Some(url) = tts.url
    {
        let base = config.synthesizer.take();
        config.synthesizer = Some(HttpSynthesizerConfig {
            url,
            api_key: tts
                .api_key
                .or_else(|| base.as_ref().and_then(|b| b.api_key.clone())),
            sample_rate: tts
                .sample_rate
                .or(base.as_ref().map(|b| b.sample_rate))
                .unwrap_or(16000),
            timeout: tts
                .timeout_seconds
                .map(secs)
                .or(base.as_ref().map(|b| b.timeout))
                .unwrap_or_else(|| secs(10)),
        });
    }

    if let Some(backend) = yaml.backend {
        if let Some(url) = backend.url {
            config.backend.url = Some(url);
        }
        if let Some(key) = backend.api_key {
            config.backend.api_key = Some(key);
        }
        if let Some(v) = backend.timeout_seconds {
            config.backend.timeout = secs(v);
        }
    }

    if let Some(carrier) = yaml.carrier {
        if let Some(url) = carrier.url {
            config.carrier.url = Some(url);
        }
        if let Some(key) = carrier.api_key {
            config.carrier.api_key = Some(key);
        }
        if let Some(v) = carrier.timeout_seconds {
            config.carrier.timeout = secs(v);
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(codec) = audio.codec {
            config.audio.codec = codec;
        }
        if let Some(v) = audio.sample_rate {
            config.audio.sample_rate = v;
        }
        if let Some(v) = audio.silence_threshold {
            config.audio.silence_threshold = v;
        }
        if let Some(v) = audio.hangover_frames {
            config.audio.hangover_frames = v;
        }
        if let Some(v) = audio.frame_duration_ms {
            config.audio.frame_duration_ms = v;
        }
    }

    if let Some(call) = yaml.call {
        if let Some(v) = call.terminal_grace_seconds {
            config.call.terminal_grace = secs(v);
        }
        if let Some(v) = call.retention_hours {
            config.call.retention = secs(v * 60 * 60);
        }
        if let Some(v) = call.sweep_interval_seconds {
            config.call.sweep_interval = secs(v);
        }
        if let Some(message) = call.welcome_message {
            config.call.welcome_message = Some(message);
        }
        if let Some(name) = call.agent_name {
            config.call.agent_name = name;
        }
        if let Some(name) = call.customer_name {
            config.call.customer_name = name;
        }
    }

    if let Some(voice) = yaml.voice {
        if let Some(id) = voice.voice_id {
            config.voice.defaults.voice_id = Some(id);
        }
        if let Some(model) = voice.model {
            config.voice.defaults.model = Some(model);
        }
        if let Some(v) = voice.cache_ttl_seconds {
            config.voice.cache_ttl = secs(v);
        }
    }

    if let Some(diagnostics) = yaml.diagnostics {
        let target = &mut config.diagnostics;
        if let Some(v) = diagnostics.max_errors {
            target.max_errors = v;
        }
        if let Some(v) = diagnostics.max_logs {
            target.max_logs = v;
        }
        if let Some(v) = diagnostics.auto_resolve_minutes {
            target.auto_resolve_after = secs(v * 60);
        }
        if let Some(v) = diagnostics.retention_minutes {
            target.retention = secs(v * 60);
        }
        if let Some(v) = diagnostics.health_window_minutes {
            target.health_window = secs(v * 60);
        }
        if let Some(v) = diagnostics.unhealthy_high_threshold {
            target.unhealthy_high_threshold = v;
        }
        if let Some(v) = diagnostics.degraded_volume_threshold {
            target.degraded_volume_threshold = v;
        }
    }

    if let Some(routing) = yaml.routing {
        if let Some(offset) = routing.utc_offset_minutes {
            config.routing.utc_offset_minutes = offset;
        }
        if let Some(rules) = routing.rules {
            config.routing.rules = rules;
        }
    }

    Ok(())
}
