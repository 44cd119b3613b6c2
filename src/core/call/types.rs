use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::carrier::CarrierError;
use crate::core::audio::AudioError;
use crate::core::diagnostics::ErrorCategory;
use crate::core::routing::RoutingDecision;
use crate::core::speech::SpeechError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum CallError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call {0} is already active")]
    CallAlreadyActive(String),

    #[error("Call {call_id} cannot move from {from} to {to}")]
    InvalidTransition {
        call_id: String,
        from: CallStatus,
        to: CallStatus,
    },

    /// The call has no open speech stream
    #[error("No active stream for call {0}")]
    StreamNotActive(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Carrier(#[from] CarrierError),
}

impl CallError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CallError::Speech(e) => e.category(),
            CallError::Audio(e) => e.category(),
            CallError::Carrier(e) => e.category(),
            _ => ErrorCategory::CallManagement,
        }
    }
}

pub type CallResult<T> = Result<T, CallError>;

// =============================================================================
// Call lifecycle
// =============================================================================

/// Lifecycle status of a call.
///
/// `incoming → {ringing | answered} → in_progress → terminal`, where the
/// terminal statuses are completed, failed, no_answer and busy. Any
/// non-terminal status may end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Incoming,
    Ringing,
    Answered,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Busy
        )
    }

    /// Answered or in progress
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Answered | CallStatus::InProgress)
    }

    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, n) if n.is_terminal() => true,
            (Incoming, Ringing | Answered) => true,
            (Ringing, Answered) => true,
            (Answered, InProgress) => true,
            _ => false,
        }
    }

    /// Parse a carrier-reported status. Accepts dashed and underscored forms;
    /// `canceled` (caller hung up before answer) maps to `NoAnswer`.
    pub fn from_carrier(status: &str) -> Option<Self> {
        let normalized = status.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "incoming" | "queued" => Some(CallStatus::Incoming),
            "ringing" => Some(CallStatus::Ringing),
            "answered" => Some(CallStatus::Answered),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "no_answer" | "canceled" | "cancelled" => Some(CallStatus::NoAnswer),
            "busy" => Some(CallStatus::Busy),
            _ => None,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Incoming => "incoming",
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Busy => "busy",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    Customer,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(rename = "type")]
    pub kind: SenderKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Transcript,
    System,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub is_automated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// One utterance in a call's conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub call_id: String,
    pub sender: MessageSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(
        call_id: &str,
        sender: MessageSender,
        content: impl Into<String>,
        kind: MessageKind,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            sender,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
            metadata,
        }
    }
}

// =============================================================================
// Call record
// =============================================================================

/// A live or recently ended phone call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub call_id: String,
    /// Carrier session id
    pub call_sid: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub customer_number: String,
    pub organization_number: String,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub language_confidence: Option<f32>,
    pub stream_active: bool,
    pub agent_has_spoken: bool,
    pub messages: Vec<Message>,
    pub routing: Option<RoutingDecision>,
    /// Latest interim customer transcript, cleared when it becomes final
    pub live_transcript: Option<String>,
    pub end_reason: Option<String>,
    /// Last status string reported by the carrier
    pub carrier_status: Option<String>,
}

impl Call {
    pub fn inbound(incoming: &IncomingCall, started_at: DateTime<Utc>) -> Self {
        Self {
            call_id: incoming.call_id.clone(),
            call_sid: incoming.call_sid.clone(),
            status: CallStatus::Incoming,
            direction: CallDirection::Inbound,
            customer_number: incoming.from.clone(),
            organization_number: incoming.to.clone(),
            started_at,
            answered_at: None,
            ended_at: None,
            language: None,
            language_confidence: None,
            stream_active: false,
            agent_has_spoken: false,
            messages: Vec::new(),
            routing: None,
            live_transcript: None,
            end_reason: None,
            carrier_status: None,
        }
    }
}

// =============================================================================
// Carrier notifications
// =============================================================================

/// Incoming-call notification from the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub call_id: String,
    pub call_sid: String,
    /// Caller number
    pub from: String,
    /// Dialed organization number
    pub to: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Status-change notification from the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub call_id: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
