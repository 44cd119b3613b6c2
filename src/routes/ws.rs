//! WebSocket route configuration
//!
//! `GET /ws/events` streams call lifecycle events as JSON text frames:
//!
//! ```json
//! {"type": "call_incoming", "call_id": "c-1", "from": "+15550001111", "to": "+15559990000", "routing": {...}}
//! {"type": "transcript_received", "call_id": "c-1", "text": "hello", "is_final": true}
//! ```
//!
//! `GET /ws/media/{call_id}` carries carrier-encoded audio frames. Binary
//! frames received are customer audio; binary frames sent are agent playback.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{events_ws_handler, media_ws_handler};
use crate::state::AppState;
use std::sync::Arc;

pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/events", get(events_ws_handler))
        .route("/ws/media/{call_id}", get(media_ws_handler))
        .layer(TraceLayer::new_for_http())
}
