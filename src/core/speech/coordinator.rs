//! Per-call transcript and speech processing.
//!
//! A processor is started for every call with an open stream. It consumes
//! the call's transport events on a dedicated task, so inbound messages are
//! handled strictly in arrival order, and it owns the call's language state,
//! capture state and long-form synthesis session.
//!
//! # Feedback Suppression
//!
//! While agent speech is synthesized or played, customer capture is suspended
//! with `stop_transcription` so the agent's own voice is not transcribed.
//! Whether capture was running before playback is kept in
//! `CaptureState::was_capturing`; capture resumes with `start_transcription`
//! a settling delay after playback ends or fails. A newer suspension
//! supersedes any pending resume.
//!
//! # Long-Form Playback
//!
//! Chunks are spoken one at a time. A chunk rendered by the local
//! synthesizer is done once the playback sink accepts it; a chunk sent to
//! the backend is done when its final `agent_tts_audio` frame arrives, or
//! counts as a failed attempt after `chunk_playback_timeout`.

use std::sync::{Arc, Weak};

use base64::prelude::*;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::base::{
    LongFormHandle, SpeechConfig, SpeechError, SpeechEvent, SpeechResult, SpeechSynthesizer,
    SynthesisRequest, Utterance,
};
use super::chunker::TextChunker;
use super::language::{LanguageState, LanguageUpdate};
use super::session::TtsSession;
use crate::core::audio::PlaybackSink;
use crate::core::events::{EventBus, Subscription};
use crate::core::transport::{
    BaseTransport, ClientMessage, ServerMessage, StreamParams, TransportEvent,
};
use crate::core::voice_config::{VoiceConfigCache, VoiceSettings};

#[derive(Debug, Clone, Copy, Default)]
struct CaptureState {
    /// Capture is currently running on the backend
    capturing: bool,
    /// Capture state saved when playback suspended it
    was_capturing: bool,
    suspended_for_playback: bool,
    /// Bumped on every suspension; a pending resume only applies if unchanged
    resume_generation: u64,
}

struct LongForm {
    session: TtsSession,
    language: String,
    cancel: CancellationToken,
}

/// A long-form chunk the backend is speaking.
struct PendingChunk {
    index: u32,
    done: oneshot::Sender<Result<(), String>>,
}

struct ProcessorState {
    default_language: String,
    language: LanguageState,
    last_activity: Instant,
    capture: CaptureState,
    long_form: Option<LongForm>,
    pending_chunk: Option<PendingChunk>,
}

impl ProcessorState {
    fn long_form_running(&self) -> bool {
        self.long_form.as_ref().is_some_and(|lf| lf.session.running)
    }
}

struct CallProcessor {
    call_id: String,
    transport: Arc<dyn BaseTransport>,
    state: Mutex<ProcessorState>,
    cancel: CancellationToken,
    subscription: Mutex<Option<Subscription>>,
}

impl CallProcessor {
    fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }
}

enum ChunkOutcome {
    Delivered,
    Failed,
    Cancelled,
}

/// Coordinates transcripts, language detection and agent speech per call.
pub struct SpeechCoordinator {
    config: SpeechConfig,
    processors: DashMap<String, Arc<CallProcessor>>,
    playback: Arc<dyn PlaybackSink>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    voice: Arc<VoiceConfigCache>,
    chunker: TextChunker,
    events: EventBus<SpeechEvent>,
}

impl SpeechCoordinator {
    /// Create a coordinator.
    ///
    /// Without a `synthesizer`, long-form chunks are sent to the backend as
    /// agent messages instead of being rendered locally.
    pub fn new(
        config: SpeechConfig,
        playback: Arc<dyn PlaybackSink>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        voice: Arc<VoiceConfigCache>,
    ) -> Self {
        let chunker = TextChunker::new(config.max_chunk_chars);
        Self {
            config,
            processors: DashMap::new(),
            playback,
            synthesizer,
            voice,
            chunker,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Register a handler for coordinator events.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SpeechEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn has_processor(&self, call_id: &str) -> bool {
        self.processors.contains_key(call_id)
    }

    pub fn active_processors(&self) -> usize {
        self.processors.len()
    }

    // =========================================================================
    // Processor lifecycle
    // =========================================================================

    /// Start processing for a call: subscribe to the transport, open the
    /// stream and begin customer capture.
    ///
    /// Starting an already running processor is a no-op.
    pub async fn start_processor(
        self: &Arc<Self>,
        call_id: &str,
        transport: Arc<dyn BaseTransport>,
        language: &str,
    ) -> SpeechResult<()> {
        if self.processors.contains_key(call_id) {
            return Ok(());
        }

        let language = if language.is_empty() {
            self.config.default_language.clone()
        } else {
            language.to_string()
        };

        let (tx, rx) = mpsc::unbounded_channel::<TransportEvent>();
        let subscription = transport.subscribe(Arc::new(move |event: &TransportEvent| {
            let _ = tx.send(event.clone());
        }));

        let processor = Arc::new(CallProcessor {
            call_id: call_id.to_string(),
            transport: transport.clone(),
            state: Mutex::new(ProcessorState {
                default_language: language.clone(),
                language: LanguageState::new(&language),
                last_activity: Instant::now(),
                capture: CaptureState::default(),
                long_form: None,
                pending_chunk: None,
            }),
            cancel: CancellationToken::new(),
            subscription: Mutex::new(Some(subscription)),
        });
        self.processors
            .insert(call_id.to_string(), processor.clone());
        tokio::spawn(Self::consume_events(
            Arc::downgrade(self),
            processor.clone(),
            rx,
        ));

        let params = StreamParams {
            call_id: call_id.to_string(),
            token: self.config.service_token.clone(),
            language,
            model: self.config.model.clone(),
        };
        if let Err(e) = transport.connect(params).await {
            tracing::warn!(call_id = %call_id, "Failed to open speech stream: {}", e);
            self.teardown(call_id);
            return Err(e.into());
        }

        processor.state.lock().capture.capturing = true;
        if let Err(e) = transport
            .send(ClientMessage::StartTranscription {
                call_id: call_id.to_string(),
            })
            .await
        {
            tracing::warn!(call_id = %call_id, "Failed to start transcription: {}", e);
            self.teardown(call_id);
            let _ = transport.disconnect().await;
            return Err(e.into());
        }

        tracing::info!(call_id = %call_id, "Speech processor started");
        Ok(())
    }

    /// Stop a call's processor, cancel its in-flight speech work and close
    /// its stream. Returns false if no processor was running.
    pub async fn stop_processor(&self, call_id: &str) -> bool {
        let Some(processor) = self.teardown(call_id) else {
            return false;
        };
        if let Err(e) = processor.transport.disconnect().await {
            tracing::warn!(call_id = %call_id, "Error closing speech stream: {}", e);
        }
        tracing::info!(call_id = %call_id, "Speech processor stopped");
        true
    }

    fn teardown(&self, call_id: &str) -> Option<Arc<CallProcessor>> {
        let (_, processor) = self.processors.remove(call_id)?;
        processor.cancel.cancel();
        processor.subscription.lock().take();
        {
            let mut state = processor.state.lock();
            state.long_form = None;
            state.pending_chunk = None;
        }
        Some(processor)
    }

    fn processor(&self, call_id: &str) -> SpeechResult<Arc<CallProcessor>> {
        self.processors
            .get(call_id)
            .map(|p| p.clone())
            .ok_or_else(|| SpeechError::NoActiveProcessor(call_id.to_string()))
    }

    // =========================================================================
    // Agent speech
    // =========================================================================

    /// Send agent text to the backend for synthesis.
    ///
    /// The language is the explicit override, else the detected language,
    /// else the call's default. A transport failure is reported as
    /// `SynthesisFailed` (and emitted as an event) and capture is resumed.
    pub async fn process_agent_message(
        &self,
        call_id: &str,
        text: &str,
        language_override: Option<&str>,
    ) -> SpeechResult<Utterance> {
        let processor = self.processor(call_id)?;
        if text.trim().is_empty() {
            return Err(SpeechError::InvalidInput("message text is empty".to_string()));
        }

        let language = self.resolve_language(&processor, language_override);
        let voice = self.voice.get().await;

        self.suspend_capture(&processor).await;
        processor.touch();

        let message = ClientMessage::AgentMessage {
            call_id: call_id.to_string(),
            text: text.to_string(),
            language: language.clone(),
            voice_id: voice.voice_id,
            model: voice.model,
            chunk_index: None,
        };

        if let Err(e) = processor.transport.send(message).await {
            let message = e.to_string();
            tracing::warn!(call_id = %call_id, "Agent message not delivered: {}", message);
            self.events.publish(&SpeechEvent::SynthesisFailed {
                call_id: call_id.to_string(),
                message: message.clone(),
            });
            self.schedule_resume(&processor);
            return Err(SpeechError::SynthesisFailed(message));
        }

        Ok(Utterance { language })
    }

    fn resolve_language(&self, processor: &CallProcessor, language_override: Option<&str>) -> String {
        if let Some(lang) = language_override.filter(|l| !l.trim().is_empty()) {
            return lang.to_string();
        }
        let state = processor.state.lock();
        if state.language.is_detected() {
            state.language.code.clone()
        } else {
            state.default_language.clone()
        }
    }

    /// Speak long text as an ordered series of chunks.
    pub async fn speak_long_form(
        self: &Arc<Self>,
        call_id: &str,
        text: &str,
        language_override: Option<&str>,
    ) -> SpeechResult<LongFormHandle> {
        let processor = self.processor(call_id)?;
        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            return Err(SpeechError::InvalidInput("message text is empty".to_string()));
        }
        let language = self.resolve_language(&processor, language_override);

        let (handle, token) = {
            let mut state = processor.state.lock();
            if state.long_form_running() {
                return Err(SpeechError::SpeechInProgress(call_id.to_string()));
            }
            let mut session = TtsSession::new(chunks);
            session.running = true;
            let token = processor.cancel.child_token();
            let handle = LongFormHandle {
                session_id: session.id.clone(),
                total_chunks: session.total(),
                start_index: 0,
                language: language.clone(),
            };
            state.long_form = Some(LongForm {
                session,
                language,
                cancel: token.clone(),
            });
            (handle, token)
        };

        tracing::info!(
            call_id = %call_id,
            chunks = handle.total_chunks,
            "Starting long-form speech"
        );
        tokio::spawn(self.clone().run_long_form(processor, token));
        Ok(handle)
    }

    /// Resume an interrupted long-form session from its next unplayed chunk.
    pub async fn resume_long_form(self: &Arc<Self>, call_id: &str) -> SpeechResult<LongFormHandle> {
        let processor = self.processor(call_id)?;

        let (handle, token) = {
            let mut state = processor.state.lock();
            let Some(lf) = state
                .long_form
                .as_mut()
                .filter(|lf| lf.session.resumable && !lf.session.running)
            else {
                return Err(SpeechError::NoResumableSession(call_id.to_string()));
            };
            lf.session.running = true;
            lf.session.resumable = false;
            let token = processor.cancel.child_token();
            lf.cancel = token.clone();
            let handle = LongFormHandle {
                session_id: lf.session.id.clone(),
                total_chunks: lf.session.total(),
                start_index: lf.session.next_index,
                language: lf.language.clone(),
            };
            (handle, token)
        };

        tracing::info!(
            call_id = %call_id,
            from_chunk = handle.start_index,
            "Resuming long-form speech"
        );
        tokio::spawn(self.clone().run_long_form(processor, token));
        Ok(handle)
    }

    /// Interrupt running long-form speech. Returns false if nothing was
    /// playing.
    pub fn interrupt_speech(&self, call_id: &str) -> SpeechResult<bool> {
        let processor = self.processor(call_id)?;
        let state = processor.state.lock();
        match state.long_form.as_ref().filter(|lf| lf.session.running) {
            Some(lf) => {
                lf.cancel.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of the call's long-form session, if any.
    pub fn long_form_session(&self, call_id: &str) -> Option<TtsSession> {
        let processor = self.processors.get(call_id)?;
        let state = processor.state.lock();
        state.long_form.as_ref().map(|lf| lf.session.clone())
    }

    async fn run_long_form(self: Arc<Self>, processor: Arc<CallProcessor>, token: CancellationToken) {
        self.suspend_capture(&processor).await;
        let voice = self.voice.get().await;
        let mut interrupted = false;

        loop {
            let next = {
                let state = processor.state.lock();
                state.long_form.as_ref().and_then(|lf| {
                    lf.session
                        .next_chunk()
                        .map(|(i, text)| (i, text.to_string(), lf.language.clone()))
                })
            };
            let Some((index, text, language)) = next else {
                break;
            };
            if token.is_cancelled() {
                interrupted = true;
                break;
            }

            let outcome = self
                .deliver_chunk(&processor, index, &text, &language, &voice, &token)
                .await;

            let finished = {
                let mut state = processor.state.lock();
                state.last_activity = Instant::now();
                let Some(lf) = state.long_form.as_mut() else {
                    break;
                };
                match outcome {
                    ChunkOutcome::Delivered => lf.session.mark_played(index),
                    ChunkOutcome::Failed => {
                        tracing::warn!(
                            call_id = %processor.call_id,
                            chunk = index,
                            "Long-form chunk failed after retries, skipping"
                        );
                        lf.session.mark_failed(index);
                    }
                    ChunkOutcome::Cancelled => {}
                }
                lf.session.is_finished()
            };

            if matches!(outcome, ChunkOutcome::Cancelled) {
                interrupted = true;
                break;
            }
            if finished {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(self.config.chunk_pause) => {}
            }
        }

        let event = {
            let mut state = processor.state.lock();
            match state.long_form.as_mut() {
                Some(lf) if interrupted && !lf.session.is_finished() => {
                    lf.session.interrupt();
                    Some(SpeechEvent::LongFormInterrupted {
                        call_id: processor.call_id.clone(),
                        next_index: lf.session.next_index,
                    })
                }
                Some(lf) => {
                    let event = SpeechEvent::LongFormCompleted {
                        call_id: processor.call_id.clone(),
                        completed: lf.session.completed,
                        failed: lf.session.failed.clone(),
                    };
                    state.long_form = None;
                    Some(event)
                }
                None => None,
            }
        };

        if processor.cancel.is_cancelled() {
            return;
        }
        if let Some(event) = event {
            self.events.publish(&event);
        }
        self.schedule_resume(&processor);
    }

    /// Render and play one chunk, retrying up to `chunk_max_retries` times.
    async fn deliver_chunk(
        &self,
        processor: &CallProcessor,
        index: usize,
        text: &str,
        language: &str,
        voice: &VoiceSettings,
        token: &CancellationToken,
    ) -> ChunkOutcome {
        for attempt in 0..=self.config.chunk_max_retries {
            if token.is_cancelled() {
                return ChunkOutcome::Cancelled;
            }

            let result = match &self.synthesizer {
                Some(synthesizer) => {
                    let request = SynthesisRequest {
                        call_id: processor.call_id.clone(),
                        text: text.to_string(),
                        language: language.to_string(),
                        voice_id: voice.voice_id.clone(),
                        model: voice.model.clone(),
                    };
                    let audio = tokio::select! {
                        _ = token.cancelled() => return ChunkOutcome::Cancelled,
                        audio = synthesizer.synthesize(request) => audio,
                    };
                    match audio {
                        Ok(audio) => self
                            .playback
                            .play(&processor.call_id, audio)
                            .await
                            .map(|_| ())
                            .map_err(SpeechError::from),
                        Err(e) => Err(e),
                    }
                }
                None => {
                    match self
                        .speak_on_stream(processor, index, text, language, voice, token)
                        .await
                    {
                        Some(result) => result,
                        None => return ChunkOutcome::Cancelled,
                    }
                }
            };

            match result {
                Ok(()) => return ChunkOutcome::Delivered,
                Err(e) => {
                    tracing::warn!(
                        call_id = %processor.call_id,
                        attempt = attempt + 1,
                        "Long-form chunk attempt failed: {}",
                        e
                    );
                }
            }
        }
        ChunkOutcome::Failed
    }

    /// Send one chunk to the backend and wait until its final audio frame
    /// has been played. Returns `None` if cancelled first.
    async fn speak_on_stream(
        &self,
        processor: &CallProcessor,
        index: usize,
        text: &str,
        language: &str,
        voice: &VoiceSettings,
        token: &CancellationToken,
    ) -> Option<SpeechResult<()>> {
        let chunk_index = index as u32;
        let (done_tx, done_rx) = oneshot::channel();
        // Registered before sending so a fast reply is not missed
        processor.state.lock().pending_chunk = Some(PendingChunk {
            index: chunk_index,
            done: done_tx,
        });

        let sent = processor
            .transport
            .send(ClientMessage::AgentMessage {
                call_id: processor.call_id.clone(),
                text: text.to_string(),
                language: language.to_string(),
                voice_id: voice.voice_id.clone(),
                model: voice.model.clone(),
                chunk_index: Some(chunk_index),
            })
            .await;

        let result = match sent {
            Err(e) => Some(Err(SpeechError::from(e))),
            Ok(()) => {
                let timeout = self.config.chunk_playback_timeout;
                tokio::select! {
                    _ = token.cancelled() => None,
                    played = tokio::time::timeout(timeout, done_rx) => Some(match played {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(message))) => Err(SpeechError::SynthesisFailed(message)),
                        Ok(Err(_)) => Err(SpeechError::SynthesisFailed(
                            "chunk playback abandoned".to_string(),
                        )),
                        Err(_) => Err(SpeechError::SynthesisFailed(format!(
                            "chunk {chunk_index} not played within {}ms",
                            timeout.as_millis()
                        ))),
                    }),
                }
            }
        };

        let mut state = processor.state.lock();
        if state
            .pending_chunk
            .as_ref()
            .is_some_and(|pending| pending.index == chunk_index)
        {
            state.pending_chunk = None;
        }
        result
    }

    /// Settle the pending long-form chunk if `chunk_index` refers to it. A
    /// frame without an index settles whichever chunk is pending.
    fn settle_chunk(
        &self,
        processor: &CallProcessor,
        chunk_index: Option<u32>,
        outcome: Result<(), String>,
    ) {
        let pending = {
            let mut state = processor.state.lock();
            let matches = state
                .pending_chunk
                .as_ref()
                .is_some_and(|pending| chunk_index.is_none_or(|i| i == pending.index));
            if matches {
                state.pending_chunk.take()
            } else {
                None
            }
        };
        if let Some(pending) = pending {
            let _ = pending.done.send(outcome);
        }
    }

    // =========================================================================
    // Language
    // =========================================================================

    pub fn language_state(&self, call_id: &str) -> Option<LanguageState> {
        let processor = self.processors.get(call_id)?;
        let state = processor.state.lock();
        Some(state.language.clone())
    }

    /// Clear the language lock for a call.
    pub fn reset_language(&self, call_id: &str) -> SpeechResult<LanguageState> {
        let processor = self.processor(call_id)?;
        let mut state = processor.state.lock();
        state.language.reset();
        tracing::info!(call_id = %call_id, "Language lock reset");
        Ok(state.language.clone())
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Whether customer capture is currently running for a call.
    pub fn is_capturing(&self, call_id: &str) -> Option<bool> {
        let processor = self.processors.get(call_id)?;
        let state = processor.state.lock();
        Some(state.capture.capturing)
    }

    /// Forward gated customer audio (linear PCM) to the backend.
    ///
    /// Audio is discarded while capture is suspended for agent playback.
    /// Returns whether the audio was sent.
    pub async fn forward_customer_audio(&self, call_id: &str, pcm: Bytes) -> SpeechResult<bool> {
        let processor = self.processor(call_id)?;
        if !processor.state.lock().capture.capturing {
            return Ok(false);
        }
        processor
            .transport
            .send(ClientMessage::CustomerAudio {
                call_id: call_id.to_string(),
                audio: BASE64_STANDARD.encode(&pcm),
            })
            .await?;
        Ok(true)
    }

    async fn suspend_capture(&self, processor: &CallProcessor) {
        let send_stop = {
            let mut state = processor.state.lock();
            let capture = &mut state.capture;
            capture.resume_generation += 1;
            if capture.suspended_for_playback {
                false
            } else {
                capture.suspended_for_playback = true;
                capture.was_capturing = capture.capturing;
                std::mem::replace(&mut capture.capturing, false)
            }
        };

        if send_stop
            && let Err(e) = processor
                .transport
                .send(ClientMessage::StopTranscription {
                    call_id: processor.call_id.clone(),
                })
                .await
        {
            tracing::warn!(call_id = %processor.call_id, "Failed to suspend transcription: {}", e);
        }
    }

    /// Resume capture after the settling delay, unless a newer suspension or
    /// running long-form speech supersedes it.
    fn schedule_resume(&self, processor: &Arc<CallProcessor>) {
        let generation = {
            let state = processor.state.lock();
            if !state.capture.suspended_for_playback {
                return;
            }
            state.capture.resume_generation
        };

        let processor = processor.clone();
        let delay = self.config.capture_resume_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = processor.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let send_start = {
                let mut state = processor.state.lock();
                if state.capture.resume_generation != generation
                    || !state.capture.suspended_for_playback
                    || state.long_form_running()
                {
                    return;
                }
                state.capture.suspended_for_playback = false;
                state.capture.capturing = state.capture.was_capturing;
                state.capture.was_capturing
            };

            if send_start
                && let Err(e) = processor
                    .transport
                    .send(ClientMessage::StartTranscription {
                        call_id: processor.call_id.clone(),
                    })
                    .await
            {
                tracing::warn!(call_id = %processor.call_id, "Failed to resume transcription: {}", e);
            }
        });
    }

    // =========================================================================
    // Inbound events
    // =========================================================================

    async fn consume_events(
        coordinator: Weak<Self>,
        processor: Arc<CallProcessor>,
        mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = processor.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            coordinator.handle_transport_event(&processor, event).await;
        }
        tracing::debug!(call_id = %processor.call_id, "Speech event consumer ended");
    }

    async fn handle_transport_event(&self, processor: &Arc<CallProcessor>, event: TransportEvent) {
        let call_id = processor.call_id.clone();
        match event {
            TransportEvent::Connected => {}
            TransportEvent::Message(message) => {
                self.handle_server_message(processor, message).await;
            }
            TransportEvent::Disconnected { code, reason } => {
                tracing::debug!(call_id = %call_id, code, "Speech stream disconnected: {}", reason);
            }
            TransportEvent::Reconnecting { attempt, delay_ms } => {
                tracing::info!(call_id = %call_id, attempt, delay_ms, "Speech stream reconnecting");
            }
            TransportEvent::Reconnected { attempt } => {
                self.events.publish(&SpeechEvent::StreamRestored {
                    call_id: call_id.clone(),
                    attempt,
                });
                // The restored backend session starts without capture
                let capturing = processor.state.lock().capture.capturing;
                if capturing
                    && let Err(e) = processor
                        .transport
                        .send(ClientMessage::StartTranscription {
                            call_id: call_id.clone(),
                        })
                        .await
                {
                    tracing::warn!(call_id = %call_id, "Failed to restart transcription: {}", e);
                }
            }
            TransportEvent::ReconnectExhausted { attempts } => {
                self.events.publish(&SpeechEvent::StreamLost {
                    call_id,
                    reason: format!("reconnection failed after {attempts} attempts"),
                });
            }
            TransportEvent::Error(message) => {
                tracing::warn!(call_id = %call_id, "Speech stream error: {}", message);
            }
        }
    }

    async fn handle_server_message(&self, processor: &Arc<CallProcessor>, message: ServerMessage) {
        let call_id = processor.call_id.clone();
        match message {
            ServerMessage::ConnectionConfirmed { .. } => {
                processor.touch();
                self.events.publish(&SpeechEvent::StreamOpened { call_id });
            }
            ServerMessage::CustomerTranscript {
                text,
                is_final,
                language,
                confidence,
            } => {
                processor.touch();

                if let (Some(code), Some(confidence)) = (language.as_deref(), confidence) {
                    let (update, state) = {
                        let mut state = processor.state.lock();
                        let update = state.language.observe(
                            code,
                            confidence,
                            &self.config.language,
                            chrono::Utc::now(),
                        );
                        (update, state.language.clone())
                    };
                    match update {
                        LanguageUpdate::Applied { .. } => {
                            self.events.publish(&SpeechEvent::LanguageDetected {
                                call_id: call_id.clone(),
                                language: state.code,
                                confidence: state.confidence,
                                locked: state.locked,
                            });
                        }
                        LanguageUpdate::Ignored | LanguageUpdate::Suppressed => {}
                    }
                }

                if !text.trim().is_empty() {
                    self.events.publish(&SpeechEvent::Transcript {
                        call_id,
                        text,
                        is_final,
                        language,
                        confidence,
                    });
                }
            }
            ServerMessage::AgentTtsAudio {
                audio,
                chunk_index,
                is_final,
            } => {
                processor.touch();
                match BASE64_STANDARD.decode(audio.as_bytes()) {
                    Ok(pcm) if !pcm.is_empty() => {
                        if let Err(e) = self.playback.play(&call_id, Bytes::from(pcm)).await {
                            tracing::warn!(call_id = %call_id, "Agent audio playback failed: {}", e);
                            self.events.publish(&SpeechEvent::SynthesisFailed {
                                call_id: call_id.clone(),
                                message: format!("playback failed: {e}"),
                            });
                            self.settle_chunk(processor, chunk_index, Err(e.to_string()));
                            self.schedule_resume(processor);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(call_id = %call_id, "Invalid agent audio payload: {}", e);
                    }
                }
                if is_final {
                    self.settle_chunk(processor, chunk_index, Ok(()));
                    self.schedule_resume(processor);
                }
            }
            ServerMessage::AgentTranscript { text, .. } => {
                processor.touch();
                self.events
                    .publish(&SpeechEvent::AgentTranscript { call_id, text });
            }
            ServerMessage::Error { message, code } => {
                processor.touch();
                tracing::warn!(call_id = %call_id, code = ?code, "Backend error: {}", message);
                self.events
                    .publish(&SpeechEvent::BackendError { call_id, message });
                self.schedule_resume(processor);
            }
            ServerMessage::CallStatusUpdate { status, .. } => {
                processor.touch();
                self.events
                    .publish(&SpeechEvent::StatusUpdate { call_id, status });
            }
            ServerMessage::Pong { .. } => {}
            ServerMessage::Unknown => {
                processor.touch();
                tracing::debug!(call_id = %call_id, "Ignoring unknown backend message");
            }
        }
    }

    // =========================================================================
    // Idle cleanup
    // =========================================================================

    /// Tear down processors idle for longer than the idle timeout. Returns
    /// the affected call ids.
    pub async fn sweep_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let idle: Vec<String> = self
            .processors
            .iter()
            .filter(|entry| {
                let state = entry.state.lock();
                !state.long_form_running()
                    && now.duration_since(state.last_activity) >= self.config.idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        for call_id in &idle {
            if self.stop_processor(call_id).await {
                tracing::info!(call_id = %call_id, "Idle speech processor removed");
                self.events.publish(&SpeechEvent::ProcessorStopped {
                    call_id: call_id.clone(),
                    reason: "idle".to_string(),
                });
            }
        }
        idle
    }

    /// Spawn the periodic idle sweep.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.idle_sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.sweep_idle().await;
            }
        })
    }
}
