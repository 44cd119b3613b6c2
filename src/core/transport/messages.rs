//! Wire protocol between the transport channel and the backend speech service.
//!
//! Messages are JSON objects tagged by a `type` field.

use serde::{Deserialize, Serialize};

/// Messages sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open (or restore after reconnect) the call's speech session
    InitializeStream {
        call_id: String,
        language: String,
        model: String,
    },

    /// Agent text to be synthesized and played to the customer
    AgentMessage {
        call_id: String,
        text: String,
        language: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Set for long-form chunks; echoed back on the chunk's audio
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_index: Option<u32>,
    },

    /// Resume customer speech capture
    StartTranscription { call_id: String },

    /// Suspend customer speech capture
    StopTranscription { call_id: String },

    /// Heartbeat
    Ping { timestamp: i64 },

    /// Customer audio frame (base64 linear PCM) for transcription
    CustomerAudio { call_id: String, audio: String },
}

/// Messages received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The backend accepted the stream
    ConnectionConfirmed {
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Carrier-side status seen by the backend
    CallStatusUpdate {
        status: String,
        #[serde(default)]
        message: Option<String>,
    },

    /// Customer speech transcript (interim or final)
    CustomerTranscript {
        text: String,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        confidence: Option<f32>,
    },

    /// Synthesized agent audio (base64 linear PCM)
    AgentTtsAudio {
        audio: String,
        #[serde(default)]
        chunk_index: Option<u32>,
        #[serde(default)]
        is_final: bool,
    },

    /// Text of what the agent is saying
    AgentTranscript {
        text: String,
        #[serde(default)]
        language: Option<String>,
    },

    /// Backend-reported error
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },

    /// Heartbeat reply
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Any message type this gateway does not understand
    #[serde(other)]
    Unknown,
}
