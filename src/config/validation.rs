//! Validation of the merged configuration.

use std::time::Duration;

use super::{ConfigError, ConfigResult, ServerConfig};
use crate::core::audio::create_codec;

const MIN_RESUME_DELAY: Duration = Duration::from_millis(400);
const MAX_RESUME_DELAY: Duration = Duration::from_millis(800);

/// Validate the final configuration.
///
/// # Errors
/// Returns the first problem found.
pub(super) fn validate(config: &ServerConfig) -> ConfigResult<()> {
    validate_speech(config)?;
    validate_urls(config)?;

    create_codec(&config.audio.codec, config.audio.sample_rate).map_err(|e| {
        ConfigError::InvalidValue {
            key: "audio.codec".to_string(),
            value: format!("{} ({e})", config.audio.codec),
        }
    })?;
    if !(0.0..=1.0).contains(&config.audio.silence_threshold) {
        return Err(ConfigError::InvalidValue {
            key: "audio.silence_threshold".to_string(),
            value: config.audio.silence_threshold.to_string(),
        });
    }

    if config.diagnostics.max_errors == 0 || config.diagnostics.max_logs == 0 {
        return Err(ConfigError::Invalid(
            "diagnostics capacities must be greater than zero".to_string(),
        ));
    }

    validate_reconnection(config)?;

    config.router()?;
    Ok(())
}

fn validate_speech(config: &ServerConfig) -> ConfigResult<()> {
    let thresholds = &config.speech.language;
    for (key, value) in [
        ("speech.switch_confidence", thresholds.switch_confidence),
        ("speech.lock_confidence", thresholds.lock_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }
    if thresholds.switch_confidence > thresholds.lock_confidence {
        return Err(ConfigError::Invalid(format!(
            "switch confidence ({}) must not exceed lock confidence ({})",
            thresholds.switch_confidence, thresholds.lock_confidence
        )));
    }

    let delay = config.speech.capture_resume_delay;
    if delay < MIN_RESUME_DELAY || delay > MAX_RESUME_DELAY {
        return Err(ConfigError::InvalidValue {
            key: "speech.capture_resume_delay_ms".to_string(),
            value: delay.as_millis().to_string(),
        });
    }

    if config.speech.max_chunk_chars == 0 {
        return Err(ConfigError::InvalidValue {
            key: "speech.max_chunk_chars".to_string(),
            value: "0".to_string(),
        });
    }
    if config.speech.chunk_playback_timeout.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: "speech.chunk_playback_timeout_ms".to_string(),
            value: "0".to_string(),
        });
    }
    if config.speech.default_language.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "speech.default_language must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Delays must strictly increase up to the last attempt and reconnection
/// must stop after a finite number of attempts.
fn validate_reconnection(config: &ServerConfig) -> ConfigResult<()> {
    let reconnection = &config.transport.reconnection;
    if reconnection.backoff_multiplier.is_nan() || reconnection.backoff_multiplier <= 1.0 {
        return Err(ConfigError::InvalidValue {
            key: "transport.reconnect.backoff_multiplier".to_string(),
            value: reconnection.backoff_multiplier.to_string(),
        });
    }
    if reconnection.initial_delay_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "transport.reconnect.initial_delay_ms".to_string(),
            value: "0".to_string(),
        });
    }
    if !reconnection.enabled {
        return Ok(());
    }
    if reconnection.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            key: "transport.reconnect.max_attempts".to_string(),
            value: "0".to_string(),
        });
    }
    let last = reconnection.final_uncapped_delay();
    if last > reconnection.max_delay_ms as f64 {
        return Err(ConfigError::Invalid(format!(
            "reconnect max delay ({} ms) is below the delay of attempt {} ({} ms)",
            reconnection.max_delay_ms, reconnection.max_attempts, last as u64
        )));
    }
    Ok(())
}

fn validate_urls(config: &ServerConfig) -> ConfigResult<()> {
    check_url("speech.service_url", &config.transport.url, &["ws", "wss"])?;
    if let Some(url) = &config.backend.url {
        check_url("backend.url", url, &["http", "https"])?;
    }
    if let Some(url) = &config.carrier.url {
        check_url("carrier.url", url, &["http", "https"])?;
    }
    if let Some(synthesizer) = &config.synthesizer {
        check_url("tts.url", &synthesizer.url, &["http", "https"])?;
    }
    Ok(())
}

fn check_url(key: &str, value: &str, schemes: &[&str]) -> ConfigResult<()> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let parsed = url::Url::parse(value).map_err(|_| invalid())?;
    if schemes.contains(&parsed.scheme()) {
        Ok(())
    } else {
        Err(invalid())
    }
}
