//! Error type returned by HTTP handlers.
//!
//! Domain errors convert into [`AppError`], which renders as a JSON body
//! `{"error": "..."}` with a status code matching the failure.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::audio::AudioError;
use crate::core::call::CallError;
use crate::core::speech::SpeechError;
use crate::core::transport::TransportError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    /// A collaborator (backend speech service, synthesizer, carrier) failed
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::CallNotFound(_) => AppError::NotFound(err.to_string()),
            CallError::CallAlreadyActive(_)
            | CallError::InvalidTransition { .. }
            | CallError::StreamNotActive(_) => AppError::Conflict(err.to_string()),
            CallError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            CallError::Speech(e) => e.into(),
            CallError::Audio(e) => e.into(),
            CallError::Carrier(e) => AppError::Upstream(e.to_string()),
        }
    }
}

impl From<SpeechError> for AppError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::NoActiveProcessor(_)
            | SpeechError::SpeechInProgress(_)
            | SpeechError::NoResumableSession(_) => AppError::Conflict(err.to_string()),
            SpeechError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            SpeechError::SynthesisFailed(_) => AppError::Upstream(err.to_string()),
            SpeechError::Transport(e) => e.into(),
            SpeechError::Audio(e) => e.into(),
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionTimeout(_) => AppError::Timeout(err.to_string()),
            TransportError::InvalidConfiguration(_) | TransportError::SerializationError(_) => {
                AppError::Internal(err.to_string())
            }
            _ => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::StreamNotFound(_) => AppError::NotFound(err.to_string()),
            AudioError::InvalidFrame(_) | AudioError::UnsupportedCodec(_) => {
                AppError::BadRequest(err.to_string())
            }
            AudioError::OutputClosed(_) => AppError::Conflict(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
