//! Carrier webhooks.

use axum::{Json, extract::State};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::call::{Call, IncomingCall, StatusUpdate};
use crate::errors::app_error::AppResult;
use crate::state::AppState;

/// New inbound call from the carrier. Routing runs before this returns.
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Json(incoming): Json<IncomingCall>,
) -> AppResult<Json<Call>> {
    info!(
        call_id = %incoming.call_id,
        call_sid = %incoming.call_sid,
        "Incoming call webhook"
    );
    let call = state.calls.handle_incoming_call(incoming).await?;
    Ok(Json(call))
}

pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Json(update): Json<StatusUpdate>,
) -> AppResult<Json<Call>> {
    debug!(call_id = %update.call_id, status = %update.status, "Call status webhook");
    let call = state.calls.handle_status_update(update).await?;
    Ok(Json(call))
}
