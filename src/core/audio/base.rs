use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::core::diagnostics::ErrorCategory;

/// Errors raised by the audio bridge.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Frame could not be decoded
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    /// Codec name not recognised
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// No stream is active for the call
    #[error("No audio stream for call {0}")]
    StreamNotFound(String),

    /// The carrier output went away mid-playback
    #[error("Carrier output closed for call {0}")]
    OutputClosed(String),
}

impl AudioError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AudioError::UnsupportedCodec(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Audio,
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Destination for synthesized agent audio.
///
/// `pcm` is 16-bit little-endian linear PCM. Returns the number of carrier
/// frames delivered.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, call_id: &str, pcm: Bytes) -> AudioResult<usize>;
}

/// Per-stream frame counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Inbound frames forwarded toward transcription
    pub forwarded_frames: u64,
    /// Inbound frames dropped as silence
    pub dropped_frames: u64,
    /// Outbound frames delivered to the carrier
    pub played_frames: u64,
}
