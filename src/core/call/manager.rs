//! Call lifecycle orchestration.
//!
//! The manager owns the call table and is the only writer of call records.
//! Incoming calls are routed, answered calls get a transport channel and a
//! speech processor, speech events are folded back into the call (live
//! transcript, messages, language), and ending a call releases every per-call
//! resource exactly once.
//!
//! # Retention
//!
//! A terminal call stays in the live table for `terminal_grace` so late
//! readers still find it, then moves to the history table. The maintenance
//! sweep drops history entries older than `retention`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::carrier::{CarrierControl, CarrierLeg};
use super::events::CallEvent;
use super::types::{
    Call, CallError, CallResult, CallStatus, IncomingCall, Message, MessageKind,
    MessageMetadata, MessageSender, SenderKind, StatusUpdate,
};
use crate::core::audio::AudioBridge;
use crate::core::diagnostics::{DiagnosticsRecorder, ErrorCategory, LogLevel, NewError, Severity};
use crate::core::events::{EventBus, Subscription};
use crate::core::persistence::CallRecordStore;
use crate::core::routing::{CallContext, RouteActionKind, Router, RoutingDecision};
use crate::core::speech::{
    LanguageState, LongFormHandle, SpeechCoordinator, SpeechError, SpeechEvent,
};
use crate::core::transport::TransportFactory;

const COMPONENT: &str = "call_manager";

#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How long a terminal call stays in the live table
    pub terminal_grace: Duration,
    /// How long ended calls are kept in history
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// Greeting spoken when a routed rule has none
    pub welcome_message: Option<String>,
    pub agent_name: String,
    pub customer_name: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            terminal_grace: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            welcome_message: None,
            agent_name: "Agent".to_string(),
            customer_name: "Customer".to_string(),
        }
    }
}

/// Collaborators the manager drives.
pub struct CallServices {
    pub router: Router,
    pub transports: Arc<dyn TransportFactory>,
    pub speech: Arc<SpeechCoordinator>,
    pub audio: Arc<AudioBridge>,
    pub store: Arc<dyn CallRecordStore>,
    pub carrier: Arc<dyn CarrierControl>,
    pub diagnostics: Arc<DiagnosticsRecorder>,
}

pub struct CallManager {
    config: CallConfig,
    router: Router,
    transports: Arc<dyn TransportFactory>,
    speech: Arc<SpeechCoordinator>,
    audio: Arc<AudioBridge>,
    store: Arc<dyn CallRecordStore>,
    carrier: Arc<dyn CarrierControl>,
    diagnostics: Arc<DiagnosticsRecorder>,
    calls: DashMap<String, Call>,
    history: DashMap<String, Call>,
    events: EventBus<CallEvent>,
    _speech_subscription: Subscription,
    weak: Weak<Self>,
}

impl CallManager {
    /// Create the manager and start consuming speech events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CallConfig, services: CallServices) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<SpeechEvent>();
        let subscription = services.speech.subscribe(move |event: &SpeechEvent| {
            let _ = tx.send(event.clone());
        });

        let manager = Arc::new_cyclic(|weak| Self {
            config,
            router: services.router,
            transports: services.transports,
            speech: services.speech,
            audio: services.audio,
            store: services.store,
            carrier: services.carrier,
            diagnostics: services.diagnostics,
            calls: DashMap::new(),
            history: DashMap::new(),
            events: EventBus::new(),
            _speech_subscription: subscription,
            weak: weak.clone(),
        });

        tokio::spawn(Self::consume_speech_events(Arc::downgrade(&manager), rx));
        manager
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsRecorder> {
        &self.diagnostics
    }

    pub fn speech(&self) -> &Arc<SpeechCoordinator> {
        &self.speech
    }

    pub fn audio(&self) -> &Arc<AudioBridge> {
        &self.audio
    }

    /// Register a handler for call lifecycle events.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CallEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// A live or archived call.
    pub fn get_call(&self, call_id: &str) -> Option<Call> {
        self.calls
            .get(call_id)
            .map(|c| c.clone())
            .or_else(|| self.history.get(call_id).map(|c| c.clone()))
    }

    /// Calls in the live table, newest first.
    pub fn list_calls(&self) -> Vec<Call> {
        let mut calls: Vec<Call> = self.calls.iter().map(|c| c.clone()).collect();
        calls.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        calls
    }

    pub fn active_call_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| !c.status.is_terminal())
            .count()
    }

    // =========================================================================
    // Incoming calls and routing
    // =========================================================================

    /// Register an incoming call and apply its routing action.
    ///
    /// A repeated notification for a known call returns the existing record
    /// without routing it again.
    pub async fn handle_incoming_call(&self, incoming: IncomingCall) -> CallResult<Call> {
        self.handle_incoming_call_at(incoming, Utc::now()).await
    }

    /// Like [`handle_incoming_call`](Self::handle_incoming_call), evaluating
    /// routing rules at `now`.
    pub async fn handle_incoming_call_at(
        &self,
        incoming: IncomingCall,
        now: DateTime<Utc>,
    ) -> CallResult<Call> {
        if incoming.call_id.trim().is_empty() {
            return Err(CallError::InvalidInput("call_id is required".to_string()));
        }
        if let Some(existing) = self.get_call(&incoming.call_id) {
            debug!(call_id = %incoming.call_id, "Duplicate incoming-call notification");
            return Ok(existing);
        }

        let decision = self.router.route(CallContext {
            caller: &incoming.from,
            organization_number: &incoming.to,
            at: now,
        });

        let mut call = Call::inbound(&incoming, incoming.timestamp.unwrap_or(now));
        call.routing = Some(decision.clone());

        match self.calls.entry(incoming.call_id.clone()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(call.clone());
            }
        }

        let call_id = incoming.call_id.as_str();
        info!(
            call_id = %call_id,
            from = %incoming.from,
            rule = ?decision.rule_name,
            action = %decision.action.kind,
            "Incoming call routed"
        );
        self.diagnostics.log(
            LogLevel::Info,
            COMPONENT,
            format!(
                "Incoming call from {} routed to {}",
                incoming.from, decision.action.kind
            ),
            Some(call_id),
        );
        self.events.publish(&CallEvent::CallIncoming {
            call_id: call_id.to_string(),
            from: incoming.from.clone(),
            to: incoming.to.clone(),
            routing: decision.clone(),
        });
        self.persist_call(call);

        self.apply_routing(call_id, &incoming.call_sid, decision)
            .await;

        self.get_call(call_id)
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))
    }

    async fn apply_routing(&self, call_id: &str, call_sid: &str, decision: RoutingDecision) {
        let leg = CarrierLeg { call_id, call_sid };
        let action = decision.action;

        match action.kind {
            RouteActionKind::Agent | RouteActionKind::Automated => {
                if self.start_call_processing(call_id, None).await.is_err() {
                    return;
                }
                let greeting = action
                    .message
                    .clone()
                    .or_else(|| self.config.welcome_message.clone());
                if let Some(text) = greeting
                    && let Err(e) = self.send_message(call_id, &text, true).await
                {
                    warn!(call_id = %call_id, "Welcome message not sent: {}", e);
                }
            }
            RouteActionKind::Voicemail => {
                match self.carrier.voicemail(leg, action.message.as_deref()).await {
                    Ok(()) => {
                        let _ = self
                            .finish(call_id, CallStatus::Completed, "voicemail", false)
                            .await;
                    }
                    Err(e) => {
                        let _ = self
                            .fail_call(call_id, e.category(), &format!("Voicemail handoff failed: {e}"))
                            .await;
                    }
                }
            }
            RouteActionKind::Forward => {
                let target = action.target.as_deref().unwrap_or_default();
                match self.carrier.forward(leg, target).await {
                    Ok(()) => {
                        let _ = self
                            .finish(
                                call_id,
                                CallStatus::Completed,
                                &format!("forwarded to {target}"),
                                false,
                            )
                            .await;
                    }
                    Err(e) => {
                        let _ = self
                            .fail_call(call_id, e.category(), &format!("Call forwarding failed: {e}"))
                            .await;
                    }
                }
            }
        }
    }

    // =========================================================================
    // Answering
    // =========================================================================

    /// Answer a call and open its speech stream.
    ///
    /// The call moves to `answered` immediately and to `in_progress` once the
    /// transport channel is connected. A failure to connect fails the call.
    pub async fn start_call_processing(
        &self,
        call_id: &str,
        language: Option<&str>,
    ) -> CallResult<Call> {
        let language = language
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.speech.config().default_language.clone());

        {
            let mut call = self
                .calls
                .get_mut(call_id)
                .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))?;
            match call.status {
                CallStatus::Incoming | CallStatus::Ringing => {}
                CallStatus::Answered | CallStatus::InProgress => {
                    return Err(CallError::CallAlreadyActive(call_id.to_string()));
                }
                from => {
                    return Err(CallError::InvalidTransition {
                        call_id: call_id.to_string(),
                        from,
                        to: CallStatus::Answered,
                    });
                }
            }
            call.status = CallStatus::Answered;
            call.answered_at = Some(Utc::now());
            call.language = Some(language.clone());
        }

        self.events.publish(&CallEvent::CallAnswered {
            call_id: call_id.to_string(),
            language: language.clone(),
        });
        self.audio.start_stream(call_id);

        let transport = self.transports.create(call_id);
        if let Err(e) = self
            .speech
            .start_processor(call_id, transport, &language)
            .await
        {
            let error = CallError::from(e);
            let _ = self
                .fail_call(
                    call_id,
                    error.category(),
                    &format!("Failed to open speech stream: {error}"),
                )
                .await;
            return Err(error);
        }

        let outcome = match self.calls.get_mut(call_id) {
            Some(mut call) if call.status == CallStatus::Answered => {
                call.status = CallStatus::InProgress;
                call.stream_active = true;
                Ok(call.clone())
            }
            Some(call) => Err(CallError::InvalidTransition {
                call_id: call_id.to_string(),
                from: call.status,
                to: CallStatus::InProgress,
            }),
            None => Err(CallError::CallNotFound(call_id.to_string())),
        };

        match outcome {
            Ok(snapshot) => {
                info!(call_id = %call_id, language = %language, "Call in progress");
                self.persist_call(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                // Ended while the stream was opening
                self.speech.stop_processor(call_id).await;
                self.audio.stop_stream(call_id);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Agent speech
    // =========================================================================

    /// Speak agent text on a call and record it as a message.
    ///
    /// Requires an open stream. If synthesis fails the message is still
    /// recorded and the failure is reported as a `call_error` event.
    pub async fn send_agent_message(&self, call_id: &str, text: &str) -> CallResult<Message> {
        let automated = self.is_automated(call_id);
        self.send_message(call_id, text, automated).await
    }

    async fn send_message(&self, call_id: &str, text: &str, automated: bool) -> CallResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CallError::InvalidInput("message text is empty".to_string()));
        }
        self.require_stream(call_id)?;

        let language = match self.speech.process_agent_message(call_id, text, None).await {
            Ok(utterance) => Some(utterance.language),
            // Reported through the coordinator's SynthesisFailed event
            Err(SpeechError::SynthesisFailed(_)) => None,
            Err(e) => return Err(speech_error(call_id, e)),
        };

        let message = Message::new(
            call_id,
            self.sender(SenderKind::Agent),
            text,
            MessageKind::Transcript,
            MessageMetadata {
                is_automated: automated,
                language,
                confidence: None,
            },
        );
        if !self.append_message(&message) {
            return Err(CallError::CallNotFound(call_id.to_string()));
        }
        Ok(message)
    }

    /// Speak long text as ordered chunks. The full text is recorded as one
    /// agent message.
    pub async fn speak_long_form(
        &self,
        call_id: &str,
        text: &str,
        language: Option<&str>,
    ) -> CallResult<LongFormHandle> {
        self.require_stream(call_id)?;
        let handle = self
            .speech
            .speak_long_form(call_id, text, language)
            .await
            .map_err(|e| speech_error(call_id, e))?;

        let message = Message::new(
            call_id,
            self.sender(SenderKind::Agent),
            text.trim(),
            MessageKind::Transcript,
            MessageMetadata {
                is_automated: self.is_automated(call_id),
                language: Some(handle.language.clone()),
                confidence: None,
            },
        );
        self.append_message(&message);
        Ok(handle)
    }

    pub async fn resume_long_form(&self, call_id: &str) -> CallResult<LongFormHandle> {
        self.require_call(call_id)?;
        self.speech
            .resume_long_form(call_id)
            .await
            .map_err(|e| speech_error(call_id, e))
    }

    pub fn interrupt_speech(&self, call_id: &str) -> CallResult<bool> {
        self.require_call(call_id)?;
        self.speech
            .interrupt_speech(call_id)
            .map_err(|e| speech_error(call_id, e))
    }

    /// Clear the call's language lock.
    pub fn reset_language(&self, call_id: &str) -> CallResult<LanguageState> {
        self.require_call(call_id)?;
        self.speech
            .reset_language(call_id)
            .map_err(|e| speech_error(call_id, e))
    }

    // =========================================================================
    // Carrier media
    // =========================================================================

    /// Feed one carrier-encoded customer frame into transcription. Returns
    /// whether the frame was forwarded.
    pub async fn handle_customer_audio(&self, call_id: &str, frame: &[u8]) -> CallResult<bool> {
        let Some(pcm) = self.audio.process_inbound(call_id, frame)? else {
            return Ok(false);
        };
        self.speech
            .forward_customer_audio(call_id, pcm)
            .await
            .map_err(|e| speech_error(call_id, e))
    }

    /// Attach the carrier-bound output for agent playback.
    pub fn attach_media_output(&self, call_id: &str, output: mpsc::Sender<Bytes>) -> CallResult<()> {
        self.audio.attach_carrier_output(call_id, output)?;
        Ok(())
    }

    pub fn detach_media_output(&self, call_id: &str) {
        self.audio.detach_carrier_output(call_id);
    }

    // =========================================================================
    // Ending
    // =========================================================================

    /// End a call and release its resources.
    ///
    /// Idempotent: ending a call that already ended returns its record and
    /// publishes nothing.
    pub async fn end_call(&self, call_id: &str, reason: &str) -> CallResult<Call> {
        self.finish(call_id, CallStatus::Completed, reason, true)
            .await
    }

    /// End a call as failed, recording the error.
    pub async fn fail_call(
        &self,
        call_id: &str,
        category: ErrorCategory,
        message: &str,
    ) -> CallResult<Call> {
        let active = self
            .calls
            .get(call_id)
            .is_some_and(|c| !c.status.is_terminal());
        if active {
            self.report_error(call_id, category, Severity::High, message);
        }
        self.finish(call_id, CallStatus::Failed, message, true)
            .await
    }

    /// Apply a carrier status notification.
    pub async fn handle_status_update(&self, update: StatusUpdate) -> CallResult<Call> {
        let call_id = update.call_id.as_str();
        let parsed = CallStatus::from_carrier(&update.status);

        {
            let Some(mut call) = self.calls.get_mut(call_id) else {
                return self
                    .history
                    .get(call_id)
                    .map(|c| c.clone())
                    .ok_or_else(|| CallError::CallNotFound(call_id.to_string()));
            };
            call.carrier_status = Some(update.status.clone());
            if parsed == Some(CallStatus::Ringing) && call.status == CallStatus::Incoming {
                call.status = CallStatus::Ringing;
            }
        }

        match parsed {
            Some(status) if status.is_terminal() => {
                self.finish(
                    call_id,
                    status,
                    &format!("carrier reported {}", update.status),
                    false,
                )
                .await
            }
            Some(status) => {
                debug!(call_id = %call_id, status = %status, "Carrier status update");
                self.require_call(call_id)
            }
            None => {
                self.diagnostics.log(
                    LogLevel::Warn,
                    COMPONENT,
                    format!("Unknown carrier status '{}'", update.status),
                    Some(call_id),
                );
                self.require_call(call_id)
            }
        }
    }

    async fn finish(
        &self,
        call_id: &str,
        status: CallStatus,
        reason: &str,
        notify_carrier: bool,
    ) -> CallResult<Call> {
        let (snapshot, ended_now) = match self.calls.get_mut(call_id) {
            Some(mut call) => {
                if call.status.is_terminal() {
                    (call.clone(), false)
                } else {
                    call.status = status;
                    call.ended_at = Some(Utc::now());
                    call.end_reason = Some(reason.to_string());
                    call.stream_active = false;
                    call.live_transcript = None;
                    (call.clone(), true)
                }
            }
            None => match self.history.get(call_id) {
                Some(call) => (call.clone(), false),
                None => return Err(CallError::CallNotFound(call_id.to_string())),
            },
        };
        if !ended_now {
            return Ok(snapshot);
        }

        self.speech.stop_processor(call_id).await;
        let stats = self.audio.stop_stream(call_id);

        info!(
            call_id = %call_id,
            status = %status,
            reason = %reason,
            audio = ?stats,
            "Call ended"
        );
        self.diagnostics.log(
            LogLevel::Info,
            COMPONENT,
            format!("Call ended ({status}): {reason}"),
            Some(call_id),
        );
        self.events.publish(&CallEvent::CallEnded {
            call_id: call_id.to_string(),
            status,
            reason: reason.to_string(),
        });
        self.persist_call(snapshot.clone());

        if notify_carrier {
            let carrier = self.carrier.clone();
            let diagnostics = self.diagnostics.clone();
            let (call_id, call_sid) = (snapshot.call_id.clone(), snapshot.call_sid.clone());
            tokio::spawn(async move {
                let leg = CarrierLeg {
                    call_id: &call_id,
                    call_sid: &call_sid,
                };
                if let Err(e) = carrier.hangup(leg).await {
                    diagnostics.record_error(
                        NewError::new(
                            e.category(),
                            Severity::Medium,
                            COMPONENT,
                            format!("Carrier hangup failed: {e}"),
                        )
                        .with_call(call_id.clone()),
                    );
                }
            });
        }

        self.schedule_archive(call_id);
        Ok(snapshot)
    }

    fn schedule_archive(&self, call_id: &str) {
        let weak = self.weak.clone();
        let grace = self.config.terminal_grace;
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(manager) = weak.upgrade() {
                manager.archive(&call_id);
            }
        });
    }

    fn archive(&self, call_id: &str) {
        if let Some((id, call)) = self.calls.remove_if(call_id, |_, c| c.status.is_terminal()) {
            debug!(call_id = %id, "Call archived");
            self.history.insert(id, call);
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Archive terminal calls past their grace period and drop history older
    /// than the retention window. Returns the number of calls dropped.
    pub fn sweep_terminal_calls(&self) -> usize {
        self.sweep_terminal_calls_at(Utc::now())
    }

    pub fn sweep_terminal_calls_at(&self, now: DateTime<Utc>) -> usize {
        let grace = chrono::Duration::from_std(self.config.terminal_grace)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        let stale: Vec<String> = self
            .calls
            .iter()
            .filter(|c| c.status.is_terminal() && c.ended_at.is_some_and(|t| t + grace <= now))
            .map(|c| c.key().clone())
            .collect();
        for call_id in &stale {
            self.archive(call_id);
        }

        let mut removed = 0;
        self.history.retain(|_, call| {
            let keep = call.ended_at.is_none_or(|t| t + retention > now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!(removed, "Swept expired call records");
        }
        removed
    }

    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.sweep_terminal_calls();
            }
        })
    }

    // =========================================================================
    // Speech events
    // =========================================================================

    async fn consume_speech_events(weak: Weak<Self>, mut rx: mpsc::UnboundedReceiver<SpeechEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(manager) = weak.upgrade() else {
                break;
            };
            manager.handle_speech_event(event).await;
        }
    }

    async fn handle_speech_event(&self, event: SpeechEvent) {
        let call_id = event.call_id().to_string();
        if !self.calls.contains_key(&call_id) {
            debug!(call_id = %call_id, "Speech event for unknown call");
            return;
        }

        match event {
            SpeechEvent::StreamOpened { .. } => {
                debug!(call_id = %call_id, "Speech stream confirmed");
            }
            SpeechEvent::Transcript {
                text,
                is_final,
                language,
                confidence,
                ..
            } => {
                self.handle_transcript(&call_id, text, is_final, language, confidence);
            }
            SpeechEvent::LanguageDetected {
                language,
                confidence,
                locked,
                ..
            } => {
                if let Some(mut call) = self.calls.get_mut(&call_id) {
                    call.language = Some(language.clone());
                    call.language_confidence = Some(confidence);
                }
                self.diagnostics.log(
                    LogLevel::Info,
                    COMPONENT,
                    format!("Language detected: {language} ({confidence:.2}, locked: {locked})"),
                    Some(&call_id),
                );
                self.events.publish(&CallEvent::LanguageDetected {
                    call_id,
                    language,
                    confidence,
                    locked,
                });
            }
            SpeechEvent::AgentTranscript { text, .. } => {
                debug!(call_id = %call_id, text = %text, "Agent transcript");
            }
            SpeechEvent::SynthesisFailed { message, .. } => {
                self.report_error(&call_id, ErrorCategory::Tts, Severity::Medium, &message);
            }
            SpeechEvent::LongFormCompleted {
                completed, failed, ..
            } => {
                info!(call_id = %call_id, completed, failed = failed.len(), "Long-form speech completed");
                if !failed.is_empty() {
                    self.report_error(
                        &call_id,
                        ErrorCategory::Tts,
                        Severity::Low,
                        &format!("{} long-form chunks failed: {:?}", failed.len(), failed),
                    );
                }
            }
            SpeechEvent::LongFormInterrupted { next_index, .. } => {
                info!(call_id = %call_id, next_index, "Long-form speech interrupted");
            }
            SpeechEvent::StatusUpdate { status, .. } => {
                debug!(call_id = %call_id, status = %status, "Backend call status");
            }
            SpeechEvent::BackendError { message, .. } => {
                self.report_error(&call_id, ErrorCategory::Stt, Severity::Medium, &message);
            }
            SpeechEvent::StreamRestored { attempt, .. } => {
                self.diagnostics.log(
                    LogLevel::Info,
                    COMPONENT,
                    format!("Speech stream restored after {attempt} attempts"),
                    Some(&call_id),
                );
            }
            SpeechEvent::StreamLost { reason, .. } => {
                let _ = self
                    .fail_call(
                        &call_id,
                        ErrorCategory::Connection,
                        &format!("Speech stream lost: {reason}"),
                    )
                    .await;
            }
            SpeechEvent::ProcessorStopped { reason, .. } => {
                let _ = self
                    .finish(
                        &call_id,
                        CallStatus::Completed,
                        &format!("speech processor stopped: {reason}"),
                        true,
                    )
                    .await;
            }
        }
    }

    /// Interim transcripts only update the live display; final ones become
    /// messages.
    fn handle_transcript(
        &self,
        call_id: &str,
        text: String,
        is_final: bool,
        language: Option<String>,
        confidence: Option<f32>,
    ) {
        let call_language = {
            let Some(mut call) = self.calls.get_mut(call_id) else {
                return;
            };
            call.live_transcript = if is_final { None } else { Some(text.clone()) };
            call.language.clone()
        };

        self.events.publish(&CallEvent::TranscriptReceived {
            call_id: call_id.to_string(),
            text: text.clone(),
            is_final,
            language: language.clone(),
            confidence,
        });

        if is_final {
            let message = Message::new(
                call_id,
                self.sender(SenderKind::Customer),
                text,
                MessageKind::Transcript,
                MessageMetadata {
                    is_automated: false,
                    language: language.or(call_language),
                    confidence,
                },
            );
            self.append_message(&message);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn require_call(&self, call_id: &str) -> CallResult<Call> {
        self.get_call(call_id)
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))
    }

    fn require_stream(&self, call_id: &str) -> CallResult<()> {
        let call = self
            .calls
            .get(call_id)
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))?;
        if !call.stream_active {
            return Err(CallError::StreamNotActive(call_id.to_string()));
        }
        Ok(())
    }

    fn is_automated(&self, call_id: &str) -> bool {
        self.calls.get(call_id).is_some_and(|c| {
            c.routing
                .as_ref()
                .is_some_and(|r| r.action.kind == RouteActionKind::Automated)
        })
    }

    fn sender(&self, kind: SenderKind) -> MessageSender {
        let name = match kind {
            SenderKind::Agent => &self.config.agent_name,
            SenderKind::Customer => &self.config.customer_name,
        };
        MessageSender {
            kind,
            name: name.clone(),
        }
    }

    /// Append to the call, publish and persist. Returns false if the call is
    /// gone.
    fn append_message(&self, message: &Message) -> bool {
        {
            let Some(mut call) = self.calls.get_mut(&message.call_id) else {
                return false;
            };
            if message.sender.kind == SenderKind::Agent {
                call.agent_has_spoken = true;
            }
            call.messages.push(message.clone());
        }

        self.events.publish(&CallEvent::MessageSent {
            call_id: message.call_id.clone(),
            message: message.clone(),
        });
        self.persist_message(message.clone());
        true
    }

    fn report_error(&self, call_id: &str, category: ErrorCategory, severity: Severity, message: &str) {
        self.diagnostics.record_error(
            NewError::new(category, severity, COMPONENT, message).with_call(call_id),
        );
        self.events.publish(&CallEvent::CallError {
            call_id: call_id.to_string(),
            category,
            message: message.to_string(),
        });
    }

    fn persist_call(&self, call: Call) {
        let store = self.store.clone();
        let diagnostics = self.diagnostics.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_call(&call).await {
                warn!(call_id = %call.call_id, "Failed to persist call: {}", e);
                diagnostics.record_error(
                    NewError::new(
                        e.category(),
                        Severity::Low,
                        COMPONENT,
                        format!("Failed to persist call: {e}"),
                    )
                    .with_call(call.call_id.clone()),
                );
            }
        });
    }

    fn persist_message(&self, message: Message) {
        let store = self.store.clone();
        let diagnostics = self.diagnostics.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_message(&message).await {
                warn!(call_id = %message.call_id, "Failed to persist message: {}", e);
                diagnostics.record_error(
                    NewError::new(
                        e.category(),
                        Severity::Low,
                        COMPONENT,
                        format!("Failed to persist message: {e}"),
                    )
                    .with_call(message.call_id.clone()),
                );
            }
        });
    }
}

fn speech_error(call_id: &str, error: SpeechError) -> CallError {
    match error {
        SpeechError::NoActiveProcessor(_) => CallError::StreamNotActive(call_id.to_string()),
        other => CallError::Speech(other),
    }
}
