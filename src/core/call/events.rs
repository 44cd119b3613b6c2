use serde::Serialize;

use super::types::{CallStatus, Message};
use crate::core::diagnostics::ErrorCategory;
use crate::core::routing::RoutingDecision;

/// Lifecycle events published by the call manager.
///
/// Serialized with a `type` tag for the UI event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    CallIncoming {
        call_id: String,
        from: String,
        to: String,
        routing: RoutingDecision,
    },
    CallAnswered {
        call_id: String,
        language: String,
    },
    CallEnded {
        call_id: String,
        status: CallStatus,
        reason: String,
    },
    MessageSent {
        call_id: String,
        message: Message,
    },
    TranscriptReceived {
        call_id: String,
        text: String,
        is_final: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    LanguageDetected {
        call_id: String,
        language: String,
        confidence: f32,
        locked: bool,
    },
    CallError {
        call_id: String,
        category: ErrorCategory,
        message: String,
    },
}

impl CallEvent {
    pub fn call_id(&self) -> &str {
        match self {
            CallEvent::CallIncoming { call_id, .. }
            | CallEvent::CallAnswered { call_id, .. }
            | CallEvent::CallEnded { call_id, .. }
            | CallEvent::MessageSent { call_id, .. }
            | CallEvent::TranscriptReceived { call_id, .. }
            | CallEvent::LanguageDetected { call_id, .. }
            | CallEvent::CallError { call_id, .. } => call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_tag() {
        let event = CallEvent::CallEnded {
            call_id: "call-1".to_string(),
            status: CallStatus::Completed,
            reason: "hangup".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call_ended");
        assert_eq!(json["status"], "completed");
        assert_eq!(event.call_id(), "call-1");
    }
}
