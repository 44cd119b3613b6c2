//! WebSocket transport channel to the backend speech service.
//!
//! One channel serves one call. The channel owns a background task that
//! multiplexes outbound messages, inbound messages and the heartbeat on a
//! single WebSocket, and reconnects with exponential backoff when the socket
//! closes abnormally.
//!
//! # Reconnection
//!
//! A close with code 1000 (or a call to [`BaseTransport::disconnect`]) ends the
//! channel. Any other close code, a read error or a failed heartbeat schedules
//! a reconnection attempt after `ReconnectionConfig::calculate_delay(attempt)`.
//! After a successful reconnect the channel re-sends its `initialize_stream`
//! message and emits [`TransportEvent::Reconnected`]. When the attempt cap is
//! reached it emits [`TransportEvent::ReconnectExhausted`] and stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::base::{
    BaseTransport, ConnectionState, ReconnectionConfig, StreamParams, TransportConfig,
    TransportError, TransportEvent, TransportFactory, TransportResult,
};
use super::messages::{ClientMessage, ServerMessage};
use crate::core::events::{EventBus, Subscription};

/// Channel capacity for outbound messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Close code used when the socket ends without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

/// How long `disconnect` waits for the connection task to close the socket.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// WebSocket implementation of [`BaseTransport`].
///
/// # Thread Safety
///
/// Shared state lives behind `Arc` so the background connection task and
/// the owning struct observe the same connection flags. `connected` is an
/// `AtomicBool` for lock-free readiness checks.
pub struct WebSocketTransport {
    config: TransportConfig,
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    /// Outbound message sender, present while the connection task runs
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
    /// Set by `disconnect` to suppress reconnection
    intentional_disconnect: Arc<AtomicBool>,
    /// Cancels the current connection task
    cancel: parking_lot::Mutex<CancellationToken>,
    events: EventBus<TransportEvent>,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: Arc::new(parking_lot::RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            ws_sender: Arc::new(Mutex::new(None)),
            connection_handle: Mutex::new(None),
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn send_message(&self, message: ClientMessage) -> TransportResult<()> {
        if let Some(sender) = self.ws_sender.lock().await.as_ref() {
            sender
                .send(message)
                .await
                .map_err(|e| TransportError::WebSocketError(e.to_string()))
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

/// Build the upgrade request: the configured URL with the call id as a query
/// parameter and the token as a bearer credential.
fn build_request(base_url: &str, params: &StreamParams) -> TransportResult<Request> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| TransportError::InvalidConfiguration(format!("Invalid URL: {e}")))?;
    url.query_pairs_mut().append_pair("call_id", &params.call_id);

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;

    if !params.token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", params.token))
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert(http::header::AUTHORIZATION, value);
    }
    Ok(request)
}

/// Open the socket within the connect timeout.
async fn open_socket(request: Request, timeout: Duration) -> TransportResult<WsStream> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
        Err(_) => Err(TransportError::ConnectionTimeout(timeout)),
        Ok(Err(tungstenite::Error::Http(response)))
            if response.status() == http::StatusCode::UNAUTHORIZED
                || response.status() == http::StatusCode::FORBIDDEN =>
        {
            Err(TransportError::AuthenticationFailed(format!(
                "Backend rejected stream credentials ({})",
                response.status()
            )))
        }
        Ok(Err(e)) => Err(TransportError::ConnectionFailed(e.to_string())),
        Ok(Ok((stream, _response))) => Ok(stream),
    }
}

/// Why the inner message loop ended.
enum LoopExit {
    Cancelled,
    NormalClose(String),
    Abnormal { code: u16, reason: String },
}

/// State owned by the background connection task.
struct ConnectionTask {
    call_id: String,
    request_params: StreamParams,
    url: String,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    reconnection: ReconnectionConfig,
    init_message: ClientMessage,
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    intentional_disconnect: Arc<AtomicBool>,
    cancel: CancellationToken,
    events: EventBus<TransportEvent>,
}

impl ConnectionTask {
    async fn run(self, sink: WsSink, source: WsSource, mut rx: mpsc::Receiver<ClientMessage>) {
        let mut sink = sink;
        let mut source = source;

        'outer: loop {
            let exit = self.pump(&mut sink, &mut source, &mut rx).await;
            self.connected.store(false, Ordering::SeqCst);

            let (code, reason) = match exit {
                LoopExit::Cancelled => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        })))
                        .await;
                    *self.state.write() = ConnectionState::Disconnected;
                    self.events.publish(&TransportEvent::Disconnected {
                        code: 1000,
                        reason: "client disconnect".to_string(),
                    });
                    break 'outer;
                }
                LoopExit::NormalClose(reason) => {
                    tracing::info!(call_id = %self.call_id, "Transport stream closed normally");
                    *self.state.write() = ConnectionState::Disconnected;
                    self.events
                        .publish(&TransportEvent::Disconnected { code: 1000, reason });
                    break 'outer;
                }
                LoopExit::Abnormal { code, reason } => (code, reason),
            };

            tracing::warn!(
                call_id = %self.call_id,
                "Transport stream closed abnormally (code {}): {}",
                code,
                reason
            );
            self.events
                .publish(&TransportEvent::Disconnected { code, reason });

            if self.intentional_disconnect.load(Ordering::SeqCst) {
                tracing::info!(call_id = %self.call_id, "Intentional disconnect, not attempting reconnection");
                *self.state.write() = ConnectionState::Disconnected;
                break 'outer;
            }

            match self.reconnect().await {
                Some((new_sink, new_source)) => {
                    sink = new_sink;
                    source = new_source;
                }
                None => break 'outer,
            }
        }

        *self.ws_sender.lock().await = None;
        tracing::debug!(call_id = %self.call_id, "Transport connection task ended");
    }

    /// Multiplex outbound messages, inbound messages and heartbeats until
    /// the socket ends or the task is cancelled.
    async fn pump(
        &self,
        sink: &mut WsSink,
        source: &mut WsSource,
        rx: &mut mpsc::Receiver<ClientMessage>,
    ) -> LoopExit {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Cancelled,

                Some(message) = rx.recv() => {
                    let json = match serde_json::to_string(&message) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!("Failed to serialize transport message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        return LoopExit::Abnormal {
                            code: ABNORMAL_CLOSE,
                            reason: format!("send failed: {e}"),
                        };
                    }
                }

                _ = heartbeat.tick() => {
                    let ping = ClientMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    };
                    let Ok(json) = serde_json::to_string(&ping) else {
                        continue;
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        return LoopExit::Abnormal {
                            code: ABNORMAL_CLOSE,
                            reason: format!("heartbeat failed: {e}"),
                        };
                    }
                }

                msg = source.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(message) => {
                                    self.events.publish(&TransportEvent::Message(message));
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse transport message: {} - {}", e, text);
                                    self.events.publish(&TransportEvent::Error(format!(
                                        "Malformed message: {e}"
                                    )));
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                                .unwrap_or((1005, String::new()));
                            return if code == 1000 {
                                LoopExit::NormalClose(reason)
                            } else {
                                LoopExit::Abnormal { code, reason }
                            };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return LoopExit::Abnormal {
                                code: ABNORMAL_CLOSE,
                                reason: e.to_string(),
                            };
                        }
                        None => {
                            return LoopExit::Abnormal {
                                code: ABNORMAL_CLOSE,
                                reason: "stream ended".to_string(),
                            };
                        }
                    }
                }
            }
        }
    }

    /// Retry with backoff until a socket opens, the attempt cap is reached or
    /// the channel is cancelled.
    async fn reconnect(&self) -> Option<(WsSink, WsSource)> {
        let mut attempt: u32 = 0;

        loop {
            if !self.reconnection.should_retry(attempt) {
                tracing::warn!(
                    call_id = %self.call_id,
                    "Reconnection disabled or max attempts ({}) reached",
                    self.reconnection.max_attempts
                );
                *self.state.write() = ConnectionState::Failed;
                self.events
                    .publish(&TransportEvent::ReconnectExhausted { attempts: attempt });
                return None;
            }

            attempt += 1;
            *self.state.write() = ConnectionState::Reconnecting;

            let delay_ms = self.reconnection.calculate_delay(attempt);
            tracing::info!(
                call_id = %self.call_id,
                "Attempting reconnection {}/{} in {}ms",
                attempt,
                self.reconnection.max_attempts,
                delay_ms
            );
            self.events
                .publish(&TransportEvent::Reconnecting { attempt, delay_ms });

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(call_id = %self.call_id, "Disconnect requested during reconnection delay");
                    *self.state.write() = ConnectionState::Disconnected;
                    return None;
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }

            let request = match build_request(&self.url, &self.request_params) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("Failed to build reconnection request: {}", e);
                    continue;
                }
            };

            match open_socket(request, self.connect_timeout).await {
                Ok(stream) => {
                    let (mut sink, source) = stream.split();

                    // Restore the backend session
                    if let Ok(json) = serde_json::to_string(&self.init_message)
                        && let Err(e) = sink.send(Message::Text(json.into())).await
                    {
                        tracing::error!("Failed to re-initialize stream after reconnection: {}", e);
                        continue;
                    }

                    tracing::info!(call_id = %self.call_id, "Reconnected on attempt {}", attempt);
                    self.connected.store(true, Ordering::SeqCst);
                    *self.state.write() = ConnectionState::Connected;
                    self.events.publish(&TransportEvent::Reconnected { attempt });
                    return Some((sink, source));
                }
                Err(e) => {
                    tracing::error!(call_id = %self.call_id, "Reconnection attempt {} failed: {}", attempt, e);
                }
            }
        }
    }
}

#[async_trait]
impl BaseTransport for WebSocketTransport {
    async fn connect(&self, params: StreamParams) -> TransportResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let request = build_request(&self.config.url, &params)?;
        self.intentional_disconnect.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connecting;

        let stream = match open_socket(request, self.config.connect_timeout).await {
            Ok(s) => s,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        tracing::info!(call_id = %params.call_id, "Connected to speech backend");

        let (sink, source) = stream.split();
        let (tx, rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let init_message = ClientMessage::InitializeStream {
            call_id: params.call_id.clone(),
            language: params.language.clone(),
            model: params.model.clone(),
        };

        let task = ConnectionTask {
            call_id: params.call_id.clone(),
            url: self.config.url.clone(),
            request_params: params,
            connect_timeout: self.config.connect_timeout,
            heartbeat_interval: self.config.heartbeat_interval,
            reconnection: self.config.reconnection.clone(),
            init_message: init_message.clone(),
            state: self.state.clone(),
            connected: self.connected.clone(),
            ws_sender: self.ws_sender.clone(),
            intentional_disconnect: self.intentional_disconnect.clone(),
            cancel,
            events: self.events.clone(),
        };

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connected;

        let handle = tokio::spawn(task.run(sink, source, rx));
        *self.connection_handle.lock().await = Some(handle);

        self.events.publish(&TransportEvent::Connected);
        self.send_message(init_message).await
    }

    async fn send(&self, message: ClientMessage) -> TransportResult<()> {
        if !self.is_ready() {
            return Err(TransportError::NotConnected);
        }
        self.send_message(message).await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        self.cancel.lock().cancel();

        if let Some(mut handle) = self.connection_handle.lock().await.take()
            && tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err()
        {
            handle.abort();
        }

        *self.ws_sender.lock().await = None;
        self.connected.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn subscribe(&self, handler: Arc<dyn Fn(&TransportEvent) + Send + Sync>) -> Subscription {
        self.events.subscribe(move |event| handler(event))
    }
}

/// Creates a fresh [`WebSocketTransport`] for every call.
pub struct WebSocketTransportFactory {
    config: TransportConfig,
}

impl WebSocketTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self, call_id: &str) -> Arc<dyn BaseTransport> {
        tracing::debug!(call_id = %call_id, "Creating transport channel");
        Arc::new(WebSocketTransport::new(self.config.clone()))
    }
}
