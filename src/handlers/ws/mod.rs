//! WebSocket endpoints
//!
//! - `events` streams call lifecycle events to UI clients as JSON text frames
//! - `media` carries carrier-encoded audio for one call in both directions

mod events;
mod media;

pub use events::events_ws_handler;
pub use media::media_ws_handler;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;
