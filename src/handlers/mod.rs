//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `calls` - Call control for the UI collaborator (start, messages, speech, end)
//! - `webhooks` - Carrier notifications (incoming calls, status changes)
//! - `diagnostics` - Error and log queries, health, manual resolution
//! - `voice` - Voice configuration refresh
//! - `ws` - Lifecycle event stream and carrier media sockets

pub mod api;
pub mod calls;
pub mod diagnostics;
pub mod voice;
pub mod webhooks;
pub mod ws;

// Re-export commonly used handlers for convenient access
pub use ws::{events_ws_handler, media_ws_handler};
