//! Carrier media socket for one call.
//!
//! Binary frames from the carrier are customer audio; agent playback is
//! written back as binary frames in the same encoding.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{MAX_WS_FRAME_SIZE, MAX_WS_MESSAGE_SIZE};
use crate::errors::app_error::AppError;
use crate::state::AppState;

/// Buffered playback frames per call
const PLAYBACK_BUFFER: usize = 256;

pub async fn media_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Response {
    let active = state
        .calls
        .get_call(&call_id)
        .is_some_and(|call| !call.status.is_terminal());
    if !active {
        return AppError::NotFound(format!("No active call {call_id}")).into_response();
    }

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_socket(socket, state, call_id))
}

async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>, call_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (playback_tx, mut playback_rx) = mpsc::channel::<Bytes>(PLAYBACK_BUFFER);

    if let Err(e) = app_state.calls.attach_media_output(&call_id, playback_tx) {
        warn!(call_id = %call_id, "Cannot attach media output: {}", e);
        let _ = sender.send(Message::Close(None)).await;
        return;
    }
    info!(call_id = %call_id, "Carrier media connected");

    let mut forwarded: u64 = 0;
    loop {
        select! {
            frame = playback_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sender.send(Message::Binary(frame)).await {
                    debug!(call_id = %call_id, "Media send failed: {}", e);
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        match app_state.calls.handle_customer_audio(&call_id, &data).await {
                            Ok(true) => forwarded += 1,
                            Ok(false) => {}
                            Err(e) => debug!(call_id = %call_id, "Customer frame dropped: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, "Media WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    app_state.calls.detach_media_output(&call_id);
    info!(call_id = %call_id, forwarded, "Carrier media disconnected");
}
