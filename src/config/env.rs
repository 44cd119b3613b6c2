//! Environment variable loading.
//!
//! Every setting has an environment variable; unset variables keep the
//! defaults. Invalid values are errors rather than silently ignored.

use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_string, millis, secs};
use super::{ConfigError, ConfigResult, ServerConfig, TlsConfig};
use crate::core::speech::HttpSynthesizerConfig;

/// Build a configuration from defaults overlaid with environment variables.
pub(super) fn load_from_env() -> ConfigResult<ServerConfig> {
    let mut config = ServerConfig::default();

    // Server
    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse::<u16>("PORT")? {
        config.port = port;
    }
    config.tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::Invalid(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
            ));
        }
    };
    config.cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS");

    // Backend speech service stream
    if let Some(url) = env_string("SPEECH_SERVICE_URL") {
        config.transport.url = url;
    }
    if let Some(v) = env_parse::<u64>("CONNECT_TIMEOUT_SECONDS")? {
        config.transport.connect_timeout = secs(v);
    }
    if let Some(v) = env_parse::<u64>("HEARTBEAT_INTERVAL_SECONDS")? {
        config.transport.heartbeat_interval = secs(v);
    }
    let reconnection = &mut config.transport.reconnection;
    if let Some(v) = env_bool("RECONNECT_ENABLED")? {
        reconnection.enabled = v;
    }
    if let Some(v) = env_parse::<u32>("RECONNECT_MAX_ATTEMPTS")? {
        reconnection.max_attempts = v;
    }
    if let Some(v) = env_parse::<u64>("RECONNECT_INITIAL_DELAY_MS")? {
        reconnection.initial_delay_ms = v;
    }
    if let Some(v) = env_parse::<u64>("RECONNECT_MAX_DELAY_MS")? {
        reconnection.max_delay_ms = v;
    }

    // Speech coordination
    let speech = &mut config.speech;
    if let Some(token) = env_string("SPEECH_SERVICE_TOKEN") {
        speech.service_token = token;
    }
    if let Some(model) = env_string("SPEECH_MODEL") {
        speech.model = model;
    }
    if let Some(language) = env_string("DEFAULT_LANGUAGE") {
        speech.default_language = language;
    }
    if let Some(v) = env_parse::<f32>("LANGUAGE_SWITCH_CONFIDENCE")? {
        speech.language.switch_confidence = v;
    }
    if let Some(v) = env_parse::<f32>("LANGUAGE_LOCK_CONFIDENCE")? {
        speech.language.lock_confidence = v;
    }
    if let Some(v) = env_bool("LANGUAGE_AUTO_LOCK")? {
        speech.language.auto_lock = v;
    }
    if let Some(v) = env_parse::<u64>("CAPTURE_RESUME_DELAY_MS")? {
        speech.capture_resume_delay = millis(v);
    }
    if let Some(v) = env_parse::<u64>("CHUNK_PAUSE_MS")? {
        speech.chunk_pause = millis(v);
    }
    if let Some(v) = env_parse::<u32>("CHUNK_MAX_RETRIES")? {
        speech.chunk_max_retries = v;
    }
    if let Some(v) = env_parse::<u64>("CHUNK_PLAYBACK_TIMEOUT_MS")? {
        speech.chunk_playback_timeout = millis(v);
    }
    if let Some(v) = env_parse::<usize>("MAX_CHUNK_CHARS")? {
        speech.max_chunk_chars = v;
    }
    if let Some(v) = env_parse::<u64>("IDLE_TIMEOUT_SECONDS")? {
        speech.idle_timeout = secs(v);
    }

    // Long-form synthesizer
    if let Some(url) = env_string("TTS_URL") {
        config.synthesizer = Some(HttpSynthesizerConfig {
            url,
            api_key: env_string("TTS_API_KEY"),
            sample_rate: 16000,
            timeout: secs(env_parse::<u64>("TTS_TIMEOUT_SECONDS")?.unwrap_or(10)),
        });
    }

    // Audio
    if let Some(codec) = env_string("AUDIO_CODEC") {
        config.audio.codec = codec;
    }
    if let Some(v) = env_parse::<u32>("AUDIO_SAMPLE_RATE")? {
        config.audio.sample_rate = v;
    }
    if let Some(v) = env_parse::<f32>("SILENCE_THRESHOLD")? {
        config.audio.silence_threshold = v;
    }
    if let Some(v) = env_parse::<u32>("SILENCE_HANGOVER_FRAMES")? {
        config.audio.hangover_frames = v;
    }

    // Call lifecycle
    if let Some(v) = env_parse::<u64>("CALL_TERMINAL_GRACE_SECONDS")? {
        config.call.terminal_grace = secs(v);
    }
    if let Some(v) = env_parse::<u64>("CALL_RETENTION_HOURS")? {
        config.call.retention = secs(v * 60 * 60);
    }
    config.call.welcome_message = env_string("WELCOME_MESSAGE");
    if let Some(name) = env_string("AGENT_NAME") {
        config.call.agent_name = name;
    }

    // Backend persistence / voice config
    config.backend.url = env_string("BACKEND_URL");
    config.backend.api_key = env_string("BACKEND_API_KEY");
    if let Some(v) = env_parse::<u64>("BACKEND_TIMEOUT_SECONDS")? {
        config.backend.timeout = secs(v);
    }

    // Carrier gateway
    config.carrier.url = env_string("CARRIER_URL");
    config.carrier.api_key = env_string("CARRIER_API_KEY");

    // Voice defaults
    config.voice.defaults.voice_id = env_string("VOICE_ID");
    config.voice.defaults.model = env_string("VOICE_MODEL");
    if let Some(v) = env_parse::<u64>("VOICE_CACHE_TTL_SECONDS")? {
        config.voice.cache_ttl = secs(v);
    }

    // Diagnostics
    if let Some(v) = env_parse::<usize>("DIAGNOSTICS_MAX_ERRORS")? {
        config.diagnostics.max_errors = v;
    }
    if let Some(v) = env_parse::<usize>("DIAGNOSTICS_MAX_LOGS")? {
        config.diagnostics.max_logs = v;
    }

    // Routing
    if let Some(v) = env_parse::<i32>("ROUTING_UTC_OFFSET_MINUTES")? {
        config.routing.utc_offset_minutes = v;
    }

    Ok(config)
}
