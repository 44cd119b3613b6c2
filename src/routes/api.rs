use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{calls, diagnostics, voice};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router for the agent UI and operators
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Call control
        .route("/calls", get(calls::list_calls))
        .route("/calls/{call_id}", get(calls::get_call))
        .route("/calls/{call_id}/start", post(calls::start_call))
        .route("/calls/{call_id}/messages", post(calls::send_message))
        .route("/calls/{call_id}/end", post(calls::end_call))
        // Long-form speech
        .route("/calls/{call_id}/speak", post(calls::speak))
        .route("/calls/{call_id}/speak/resume", post(calls::resume_speech))
        .route(
            "/calls/{call_id}/speak/interrupt",
            post(calls::interrupt_speech),
        )
        .route(
            "/calls/{call_id}/language/reset",
            post(calls::reset_language),
        )
        // Diagnostics
        .route("/diagnostics/errors", get(diagnostics::list_errors))
        .route(
            "/diagnostics/errors/{id}/resolve",
            post(diagnostics::resolve_error),
        )
        .route("/diagnostics/logs", get(diagnostics::list_logs))
        .route("/diagnostics/health", get(diagnostics::health))
        // Voice configuration
        .route("/voice/refresh", post(voice::refresh_voice))
        .layer(TraceLayer::new_for_http())
}
