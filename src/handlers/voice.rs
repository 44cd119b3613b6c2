use axum::{Json, extract::State};
use std::sync::Arc;
use tracing::info;

use crate::core::voice_config::VoiceSettings;
use crate::state::AppState;

/// Drop the cached voice settings and fetch them again.
///
/// Falls back to the configured defaults when the backend is unreachable.
pub async fn refresh_voice(State(state): State<Arc<AppState>>) -> Json<VoiceSettings> {
    let settings = state.voice.refresh().await;
    info!(voice_id = ?settings.voice_id, model = ?settings.model, "Voice settings refreshed");
    Json(settings)
}
