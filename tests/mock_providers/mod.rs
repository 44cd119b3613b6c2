//! Mock collaborators for integration tests
//!
//! - `MockTransport` / `MockTransportFactory`: in-memory speech stream that
//!   records outbound messages and lets tests inject backend events
//! - `MockSynthesizer` / `RecordingSink`: long-form synthesis and playback
//! - `MockCarrier` / `MemoryStore`: carrier instructions and call records
//! - `websocket_mock`: a real WebSocket speech backend for the transport
//!   channel tests

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

pub mod websocket_mock;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use waav_telephony::core::audio::{AudioError, AudioResult, PlaybackSink};
use waav_telephony::core::call::{CarrierControl, CarrierError, CarrierLeg, CarrierResult};
use waav_telephony::core::events::{EventBus, Subscription};
use waav_telephony::core::persistence::{CallRecordStore, PersistenceResult};
use waav_telephony::core::speech::{
    SpeechError, SpeechResult, SpeechSynthesizer, SynthesisRequest,
};
use waav_telephony::core::transport::{
    BaseTransport, ClientMessage, ConnectionState, ServerMessage, StreamParams, TransportError,
    TransportEvent, TransportFactory, TransportResult,
};
use waav_telephony::core::{Call, Message};

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Transport
// =============================================================================

/// In-memory speech stream.
pub struct MockTransport {
    pub params: Mutex<Option<StreamParams>>,
    sent: Mutex<Vec<ClientMessage>>,
    events: EventBus<TransportEvent>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_agent_messages: AtomicBool,
    /// Failing sends of agent messages left before they succeed again
    agent_failures_left: AtomicU32,
    /// Answer each long-form chunk with its final audio frame
    auto_play_chunks: AtomicBool,
    pub disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            params: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            events: EventBus::new(),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_agent_messages: AtomicBool::new(false),
            agent_failures_left: AtomicU32::new(0),
            auto_play_chunks: AtomicBool::new(true),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every `agent_message` send fail.
    pub fn set_fail_agent_messages(&self, fail: bool) {
        self.fail_agent_messages.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` `agent_message` sends fail.
    pub fn fail_next_agent_messages(&self, count: u32) {
        self.agent_failures_left.store(count, Ordering::SeqCst);
    }

    /// Stop answering long-form chunks; tests then emit the audio frames.
    pub fn set_auto_play_chunks(&self, enabled: bool) {
        self.auto_play_chunks.store(enabled, Ordering::SeqCst);
    }

    /// Final (empty) audio frame for a long-form chunk.
    pub fn finish_chunk(&self, chunk_index: u32) {
        self.emit_message(ServerMessage::AgentTtsAudio {
            audio: String::new(),
            chunk_index: Some(chunk_index),
            is_final: true,
        });
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Texts of the agent messages sent, in order.
    pub fn agent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::AgentMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// `true` for each start_transcription, `false` for each stop, in order.
    pub fn capture_commands(&self) -> Vec<bool> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::StartTranscription { .. } => Some(true),
                ClientMessage::StopTranscription { .. } => Some(false),
                _ => None,
            })
            .collect()
    }

    pub fn count_sent<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ClientMessage) -> bool,
    {
        self.sent.lock().iter().filter(|m| predicate(m)).count()
    }

    /// Deliver an event as if it came from the channel.
    pub fn emit(&self, event: TransportEvent) {
        self.events.publish(&event);
    }

    pub fn emit_message(&self, message: ServerMessage) {
        self.emit(TransportEvent::Message(message));
    }

    pub fn transcript(&self, text: &str, is_final: bool, language: Option<(&str, f32)>) {
        self.emit_message(ServerMessage::CustomerTranscript {
            text: text.to_string(),
            is_final,
            language: language.map(|(code, _)| code.to_string()),
            confidence: language.map(|(_, confidence)| confidence),
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseTransport for MockTransport {
    async fn connect(&self, params: StreamParams) -> TransportResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionTimeout(Duration::from_secs(10)));
        }
        let init = ClientMessage::InitializeStream {
            call_id: params.call_id.clone(),
            language: params.language.clone(),
            model: params.model.clone(),
        };
        *self.params.lock() = Some(params);
        self.connected.store(true, Ordering::SeqCst);
        self.sent.lock().push(init);
        self.events.publish(&TransportEvent::Connected);
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> TransportResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if matches!(message, ClientMessage::AgentMessage { .. }) {
            if self.fail_agent_messages.load(Ordering::SeqCst) {
                return Err(TransportError::WebSocketError("send failed".to_string()));
            }
            let left = self.agent_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.agent_failures_left.store(left - 1, Ordering::SeqCst);
                return Err(TransportError::WebSocketError("send failed".to_string()));
            }
        }
        let chunk = match &message {
            ClientMessage::AgentMessage {
                chunk_index: Some(i),
                ..
            } => Some(*i),
            _ => None,
        };
        self.sent.lock().push(message);
        if let Some(i) = chunk
            && self.auto_play_chunks.load(Ordering::SeqCst)
        {
            self.finish_chunk(i);
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        if self.is_ready() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn subscribe(&self, handler: Arc<dyn Fn(&TransportEvent) + Send + Sync>) -> Subscription {
        self.events.subscribe(move |event| handler(event))
    }
}

/// Hands out one [`MockTransport`] per call and keeps them for inspection.
#[derive(Default)]
pub struct MockTransportFactory {
    transports: DashMap<String, Arc<MockTransport>>,
    fail_connect: AtomicBool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created from now on fail to connect.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn transport(&self, call_id: &str) -> Option<Arc<MockTransport>> {
        self.transports.get(call_id).map(|t| t.clone())
    }

    pub fn created(&self) -> usize {
        self.transports.len()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, call_id: &str) -> Arc<dyn BaseTransport> {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_connect(self.fail_connect.load(Ordering::SeqCst));
        self.transports
            .insert(call_id.to_string(), transport.clone());
        transport
    }
}

// =============================================================================
// Synthesis and playback
// =============================================================================

/// Synthesizer returning 160 bytes of PCM per request.
#[derive(Default)]
pub struct MockSynthesizer {
    requests: Mutex<Vec<SynthesisRequest>>,
    /// Chunk texts that always fail
    failing_texts: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let synth = Self::default();
        *synth.delay.lock() = delay;
        synth
    }

    pub fn fail_text(&self, text: &str) {
        self.failing_texts.lock().push(text.to_string());
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.text).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> SpeechResult<Bytes> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fails = self.failing_texts.lock().contains(&request.text);
        self.requests.lock().push(request);
        if fails {
            return Err(SpeechError::SynthesisFailed("mock synthesis failure".to_string()));
        }
        Ok(Bytes::from(vec![0u8; 160]))
    }
}

/// Playback sink that records what was played.
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<(String, usize)>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<(String, usize)> {
        self.played.lock().clone()
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn play(&self, call_id: &str, pcm: Bytes) -> AudioResult<usize> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AudioError::OutputClosed(call_id.to_string()));
        }
        self.played.lock().push((call_id.to_string(), pcm.len()));
        Ok(1)
    }
}

// =============================================================================
// Carrier and persistence
// =============================================================================

/// Carrier instruction recorded by [`MockCarrier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierAction {
    Forward { call_sid: String, target: String },
    Voicemail { call_sid: String, greeting: Option<String> },
    Hangup { call_sid: String },
}

#[derive(Default)]
pub struct MockCarrier {
    actions: Mutex<Vec<CarrierAction>>,
    fail: AtomicBool,
}

impl MockCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<CarrierAction> {
        self.actions.lock().clone()
    }

    fn record(&self, action: CarrierAction) -> CarrierResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CarrierError::Request("carrier unavailable".to_string()));
        }
        self.actions.lock().push(action);
        Ok(())
    }
}

#[async_trait]
impl CarrierControl for MockCarrier {
    async fn forward(&self, leg: CarrierLeg<'_>, target: &str) -> CarrierResult<()> {
        self.record(CarrierAction::Forward {
            call_sid: leg.call_sid.to_string(),
            target: target.to_string(),
        })
    }

    async fn voicemail(&self, leg: CarrierLeg<'_>, greeting: Option<&str>) -> CarrierResult<()> {
        self.record(CarrierAction::Voicemail {
            call_sid: leg.call_sid.to_string(),
            greeting: greeting.map(str::to_string),
        })
    }

    async fn hangup(&self, leg: CarrierLeg<'_>) -> CarrierResult<()> {
        self.record(CarrierAction::Hangup {
            call_sid: leg.call_sid.to_string(),
        })
    }
}

/// Call record store kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub calls: Mutex<Vec<Call>>,
    pub messages: Mutex<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, call_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.call_id == call_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CallRecordStore for MemoryStore {
    async fn save_call(&self, call: &Call) -> PersistenceResult<()> {
        self.calls.lock().push(call.clone());
        Ok(())
    }

    async fn save_message(&self, message: &Message) -> PersistenceResult<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}
