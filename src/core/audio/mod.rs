//! Audio bridge module.
//!
//! Moves audio between the carrier media socket and the speech pipeline:
//! inbound carrier frames are decoded and silence-gated before transcription,
//! and synthesized agent audio is encoded into carrier frames for playback.

mod base;
mod bridge;
mod codec;
mod gate;

pub use base::{AudioError, AudioResult, PlaybackSink, StreamStats};
pub use bridge::{AudioBridge, AudioConfig};
pub use codec::{
    AudioCodec, Linear16Codec, MulawCodec, create_codec, pcm_from_le_bytes, pcm_to_le_bytes,
};
pub use gate::{GateDecision, SilenceGate, rms};
