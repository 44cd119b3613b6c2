//! Base traits and types for the transcript/speech coordinator.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use super::language::LanguageThresholds;
use crate::core::audio::AudioError;
use crate::core::diagnostics::ErrorCategory;
use crate::core::transport::TransportError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum SpeechError {
    /// No processor is running for the call
    #[error("No active speech processor for call {0}")]
    NoActiveProcessor(String),

    /// The backend or synthesizer could not produce speech
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Long-form speech is already playing for the call
    #[error("Speech already in progress for call {0}")]
    SpeechInProgress(String),

    /// There is no interrupted long-form session to resume
    #[error("No resumable speech session for call {0}")]
    NoResumableSession(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl SpeechError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpeechError::SynthesisFailed(_) => ErrorCategory::Tts,
            SpeechError::Transport(e) => e.category(),
            SpeechError::Audio(e) => e.category(),
            _ => ErrorCategory::CallManagement,
        }
    }
}

pub type SpeechResult<T> = Result<T, SpeechError>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Language used until one is detected
    pub default_language: String,
    /// Transcription model requested from the backend
    pub model: String,
    /// Bearer token presented to the backend speech service
    pub service_token: String,
    pub language: LanguageThresholds,
    /// Delay between the end of agent playback and resuming capture
    pub capture_resume_delay: Duration,
    /// Pause between long-form chunks
    pub chunk_pause: Duration,
    /// Retries per long-form chunk before it is marked failed
    pub chunk_max_retries: u32,
    /// How long a chunk spoken by the backend may take to finish playing
    pub chunk_playback_timeout: Duration,
    /// Upper bound on a long-form chunk, in characters
    pub max_chunk_chars: usize,
    /// Processors idle this long are torn down
    pub idle_timeout: Duration,
    pub idle_sweep_interval: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            model: "nova-2".to_string(),
            service_token: String::new(),
            language: LanguageThresholds::default(),
            capture_resume_delay: Duration::from_millis(600),
            chunk_pause: Duration::from_millis(200),
            chunk_max_retries: 2,
            chunk_playback_timeout: Duration::from_secs(30),
            max_chunk_chars: 250,
            idle_timeout: Duration::from_secs(5 * 60),
            idle_sweep_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the coordinator to the call manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// The backend confirmed the stream
    StreamOpened { call_id: String },
    /// Customer speech
    Transcript {
        call_id: String,
        text: String,
        is_final: bool,
        language: Option<String>,
        confidence: Option<f32>,
    },
    /// The call's language state changed
    LanguageDetected {
        call_id: String,
        language: String,
        confidence: f32,
        locked: bool,
    },
    /// Text of what the agent is saying
    AgentTranscript { call_id: String, text: String },
    /// Agent speech could not be produced; the call continues
    SynthesisFailed { call_id: String, message: String },
    /// A long-form request finished (every chunk played or skipped)
    LongFormCompleted {
        call_id: String,
        completed: usize,
        failed: Vec<usize>,
    },
    /// A long-form request was interrupted and can be resumed
    LongFormInterrupted { call_id: String, next_index: usize },
    /// Backend-reported call status
    StatusUpdate { call_id: String, status: String },
    /// Backend-reported error
    BackendError { call_id: String, message: String },
    /// The transport reconnected
    StreamRestored { call_id: String, attempt: u32 },
    /// The transport gave up reconnecting
    StreamLost { call_id: String, reason: String },
    /// The processor was torn down without `stop_processor`
    ProcessorStopped { call_id: String, reason: String },
}

impl SpeechEvent {
    pub fn call_id(&self) -> &str {
        match self {
            SpeechEvent::StreamOpened { call_id }
            | SpeechEvent::Transcript { call_id, .. }
            | SpeechEvent::LanguageDetected { call_id, .. }
            | SpeechEvent::AgentTranscript { call_id, .. }
            | SpeechEvent::SynthesisFailed { call_id, .. }
            | SpeechEvent::LongFormCompleted { call_id, .. }
            | SpeechEvent::LongFormInterrupted { call_id, .. }
            | SpeechEvent::StatusUpdate { call_id, .. }
            | SpeechEvent::BackendError { call_id, .. }
            | SpeechEvent::StreamRestored { call_id, .. }
            | SpeechEvent::StreamLost { call_id, .. }
            | SpeechEvent::ProcessorStopped { call_id, .. } => call_id,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// One text-to-speech rendering request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub call_id: String,
    pub text: String,
    pub language: String,
    pub voice_id: Option<String>,
    pub model: Option<String>,
}

/// Renders text to 16-bit little-endian linear PCM.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> SpeechResult<Bytes>;
}

/// Summary of an accepted agent utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    /// Language the text was sent for synthesis in
    pub language: String,
}

/// Handle returned when long-form speech starts or resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongFormHandle {
    pub session_id: String,
    pub total_chunks: usize,
    /// Index of the first chunk this run will play
    pub start_index: usize,
    /// Language the chunks are spoken in
    pub language: String,
}
