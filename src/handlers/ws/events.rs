//! Lifecycle event stream.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{MAX_WS_FRAME_SIZE, MAX_WS_MESSAGE_SIZE};
use crate::core::call::CallEvent;
use crate::state::AppState;

/// Upgrade to a socket that receives every [`CallEvent`] as a JSON text frame.
pub async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_events_socket(socket, state))
}

async fn handle_events_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Event stream connected");

    let (mut sender, mut receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<CallEvent>();

    // Dropped at the end of this function, which unsubscribes
    let _subscription = app_state.calls.subscribe(move |event: &CallEvent| {
        let _ = event_tx.send(event.clone());
    });

    loop {
        select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize call event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!("Event stream send failed: {}", e);
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Event stream WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    info!("Event stream disconnected");
}
