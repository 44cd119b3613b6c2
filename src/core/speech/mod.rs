//! Transcript/speech coordinator module.
//!
//! Runs one processor per call on top of that call's transport channel.
//! Processors surface customer transcripts and language detections, send
//! agent text for synthesis while suppressing capture of the agent's own
//! audio, and play long text as ordered, resumable chunks.

mod base;
mod chunker;
mod coordinator;
mod language;
mod session;
mod synthesizer;

pub use base::{
    LongFormHandle, SpeechConfig, SpeechError, SpeechEvent, SpeechResult, SpeechSynthesizer,
    SynthesisRequest, Utterance,
};
pub use chunker::TextChunker;
pub use coordinator::SpeechCoordinator;
pub use language::{LanguageState, LanguageThresholds, LanguageUpdate};
pub use session::TtsSession;
pub use synthesizer::{HttpSynthesizer, HttpSynthesizerConfig};
