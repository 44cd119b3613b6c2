//! Call control endpoints used by the agent UI.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::call::{Call, Message};
use crate::core::speech::{LanguageState, LongFormHandle};
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

const DEFAULT_END_REASON: &str = "ended by agent";

#[derive(Debug, Default, Deserialize)]
pub struct StartCallRequest {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndCallRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InterruptResponse {
    pub interrupted: bool,
}

/// All known calls, newest first.
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<Call>> {
    Json(state.calls.list_calls())
}

pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<Json<Call>> {
    state
        .calls
        .get_call(&call_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Call not found: {call_id}")))
}

/// Answer the call and open its speech stream.
pub async fn start_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    body: Option<Json<StartCallRequest>>,
) -> AppResult<Json<Call>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    info!(call_id = %call_id, language = ?request.language, "Starting call processing");

    let call = state
        .calls
        .start_call_processing(&call_id, request.language.as_deref())
        .await?;
    Ok(Json(call))
}

/// Speak an agent message on the call.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }
    let message = state.calls.send_agent_message(&call_id, &request.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Start long-form speech. Playback continues in the background.
pub async fn speak(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(request): Json<SpeakRequest>,
) -> AppResult<(StatusCode, Json<LongFormHandle>)> {
    let handle = state
        .calls
        .speak_long_form(&call_id, &request.text, request.language.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

pub async fn resume_speech(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<(StatusCode, Json<LongFormHandle>)> {
    let handle = state.calls.resume_long_form(&call_id).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

pub async fn interrupt_speech(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<Json<InterruptResponse>> {
    let interrupted = state.calls.interrupt_speech(&call_id)?;
    Ok(Json(InterruptResponse { interrupted }))
}

pub async fn reset_language(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<Json<LanguageState>> {
    Ok(Json(state.calls.reset_language(&call_id)?))
}

/// End the call. Ending an already ended call returns its record.
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    body: Option<Json<EndCallRequest>>,
) -> AppResult<Json<Call>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let reason = request
        .reason
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_END_REASON);

    let call = state.calls.end_call(&call_id, reason).await?;
    Ok(Json(call))
}
