//! WebSocket mock of the backend speech service
//!
//! Accepts stream connections, records every JSON message received and
//! answers the way the backend does:
//! - `initialize_stream` -> `connection_confirmed`
//! - `agent_message` -> one `agent_tts_audio` chunk marked final
//! - `ping` -> `pong`
//!
//! The first `drop_connections` connections are closed abnormally right
//! after initialization to exercise reconnection.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// Shared state of the mock backend.
#[derive(Default)]
pub struct SpeechBackendState {
    /// Every JSON message received, across connections
    pub received: Mutex<Vec<Value>>,
    /// Request URIs of accepted upgrades
    pub uris: Mutex<Vec<String>>,
    /// Authorization header values of accepted upgrades
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub connection_count: AtomicUsize,
    drop_connections: AtomicU32,
    /// Reject upgrades with 401 when set
    reject_auth: std::sync::atomic::AtomicBool,
}

impl SpeechBackendState {
    pub fn received_types(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|v| v["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count_type(&self, kind: &str) -> usize {
        self.received_types().iter().filter(|t| *t == kind).count()
    }
}

/// Running mock server.
pub struct SpeechBackendMock {
    pub addr: SocketAddr,
    pub state: Arc<SpeechBackendState>,
    handle: tokio::task::JoinHandle<()>,
}

impl SpeechBackendMock {
    pub async fn start() -> Self {
        Self::start_with(0, false).await
    }

    /// Start a server that closes its first `drop_connections` connections
    /// with code 1011 after initialization.
    pub async fn start_dropping(drop_connections: u32) -> Self {
        Self::start_with(drop_connections, false).await
    }

    pub async fn start_rejecting_auth() -> Self {
        Self::start_with(0, true).await
    }

    async fn start_with(drop_connections: u32, reject_auth: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SpeechBackendState::default());
        state
            .drop_connections
            .store(drop_connections, Ordering::SeqCst);
        state.reject_auth.store(reject_auth, Ordering::SeqCst);

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/stream", self.addr)
    }
}

impl Drop for SpeechBackendMock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<SpeechBackendState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = state.clone();
    let ws_stream = accept_hdr_async(stream, move |request: &Request, response: Response| {
        header_state.uris.lock().push(request.uri().to_string());
        header_state.auth_headers.lock().push(
            request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        if header_state.reject_auth.load(Ordering::SeqCst) {
            let mut rejection = http::Response::new(Some("unauthorized".to_string()));
            *rejection.status_mut() = http::StatusCode::UNAUTHORIZED;
            return Err(rejection);
        }
        Ok(response)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    state.connection_count.fetch_add(1, Ordering::SeqCst);

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let value: Value = serde_json::from_str(&text)?;
        state.received.lock().push(value.clone());

        match value["type"].as_str() {
            Some("initialize_stream") => {
                let confirmed = json!({
                    "type": "connection_confirmed",
                    "session_id": format!("session-{}", state.connection_count.load(Ordering::SeqCst)),
                });
                write.send(Message::Text(confirmed.to_string().into())).await?;

                let drops_left = state.drop_connections.load(Ordering::SeqCst);
                if drops_left > 0 {
                    state.drop_connections.store(drops_left - 1, Ordering::SeqCst);
                    write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Error,
                            reason: "backend restarting".into(),
                        })))
                        .await?;
                    break;
                }
            }
            Some("agent_message") => {
                let audio = json!({
                    "type": "agent_tts_audio",
                    "audio": "AAAAAAAAAAA=",
                    "chunk_index": value["chunk_index"].as_u64().unwrap_or(0),
                    "is_final": true,
                });
                write.send(Message::Text(audio.to_string().into())).await?;
            }
            Some("ping") => {
                let pong = json!({ "type": "pong", "timestamp": value["timestamp"] });
                write.send(Message::Text(pong.to_string().into())).await?;
            }
            _ => {}
        }
    }
    Ok(())
}
