use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::core::diagnostics::HealthStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub active_calls: usize,
    pub active_processors: usize,
}

/// Liveness check with a summary of the running system.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.diagnostics.health().status,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_calls: state.calls.active_call_count(),
        active_processors: state.speech.active_processors(),
    })
}
