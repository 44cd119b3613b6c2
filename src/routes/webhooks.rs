//! Carrier webhook routes
//!
//! `POST /webhooks/calls/incoming` - new inbound call
//! `POST /webhooks/calls/status` - carrier status change

use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::webhooks;
use crate::state::AppState;
use std::sync::Arc;

pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/calls/incoming", post(webhooks::incoming_call))
        .route("/webhooks/calls/status", post(webhooks::call_status))
        .layer(TraceLayer::new_for_http())
}
