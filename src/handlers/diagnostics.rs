//! Operator diagnostics endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::diagnostics::{ErrorFilter, ErrorRecord, HealthReport, LogFilter, LogLine};
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub id: String,
    pub resolved: bool,
}

/// Error records matching the query filters, newest first.
pub async fn list_errors(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ErrorFilter>,
) -> Json<Vec<ErrorRecord>> {
    Json(state.diagnostics.query_errors(&filter))
}

pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LogFilter>,
) -> Json<Vec<LogLine>> {
    Json(state.diagnostics.query_logs(&filter))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.diagnostics.health())
}

pub async fn resolve_error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ResolveResponse>> {
    if !state.diagnostics.resolve(&id) {
        return Err(AppError::NotFound(format!("Error record not found: {id}")));
    }
    Ok(Json(ResolveResponse { id, resolved: true }))
}
