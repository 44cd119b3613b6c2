//! Speech Coordinator Tests
//!
//! Drives the coordinator through an in-memory transport: capture
//! suspension around agent speech, language detection, long-form chunk
//! playback with retries, interruption and resumption, stream recovery and
//! idle cleanup.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;

use mock_providers::{MockSynthesizer, MockTransport, RecordingSink, wait_for};
use waav_telephony::core::events::Subscription;
use waav_telephony::core::speech::{
    SpeechConfig, SpeechCoordinator, SpeechError, SpeechEvent, SpeechSynthesizer, TextChunker,
};
use waav_telephony::core::transport::{ClientMessage, ServerMessage, TransportEvent};
use waav_telephony::core::voice_config::{VoiceConfig, VoiceConfigCache};

const CALL: &str = "call-1";
const WAIT: Duration = Duration::from_secs(3);
const RESUME_DELAY: Duration = Duration::from_millis(100);

const LONG_TEXT: &str = "Thanks for calling us today. Your order shipped this morning. \
    It should arrive on Friday. Is there anything else I can help with?";

fn fast_config() -> SpeechConfig {
    SpeechConfig {
        capture_resume_delay: RESUME_DELAY,
        chunk_pause: Duration::from_millis(10),
        chunk_max_retries: 2,
        chunk_playback_timeout: Duration::from_millis(500),
        max_chunk_chars: 40,
        ..Default::default()
    }
}

struct Harness {
    coordinator: Arc<SpeechCoordinator>,
    transport: Arc<MockTransport>,
    sink: Arc<RecordingSink>,
    synthesizer: Option<Arc<MockSynthesizer>>,
    events: Arc<Mutex<Vec<SpeechEvent>>>,
    _subscription: Subscription,
}

impl Harness {
    fn new(config: SpeechConfig, synthesizer: Option<Arc<MockSynthesizer>>) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let voice = Arc::new(VoiceConfigCache::new(VoiceConfig::default()));
        let coordinator = Arc::new(SpeechCoordinator::new(
            config,
            sink.clone(),
            synthesizer
                .clone()
                .map(|s| s as Arc<dyn SpeechSynthesizer>),
            voice,
        ));
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        let subscription = coordinator.subscribe(move |event| recorded.lock().push(event.clone()));
        Self {
            coordinator,
            transport: Arc::new(MockTransport::new()),
            sink,
            synthesizer,
            events,
            _subscription: subscription,
        }
    }

    async fn started(config: SpeechConfig, synthesizer: Option<Arc<MockSynthesizer>>) -> Self {
        let harness = Self::new(config, synthesizer);
        harness
            .coordinator
            .start_processor(CALL, harness.transport.clone(), "en")
            .await
            .unwrap();
        harness
    }

    fn events(&self) -> Vec<SpeechEvent> {
        self.events.lock().clone()
    }

    fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SpeechEvent) -> bool,
    {
        self.events.lock().iter().any(predicate)
    }

    async fn wait_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SpeechEvent) -> bool,
    {
        wait_for(WAIT, || self.has_event(&predicate)).await
    }

    fn final_audio(&self, bytes: usize) {
        self.transport.emit_message(ServerMessage::AgentTtsAudio {
            audio: BASE64_STANDARD.encode(vec![1u8; bytes]),
            chunk_index: Some(0),
            is_final: true,
        });
    }
}

// =============================================================================
// Processor lifecycle
// =============================================================================

#[tokio::test]
async fn test_start_opens_stream_and_begins_capture() {
    let h = Harness::started(fast_config(), None).await;

    let sent = h.transport.sent();
    assert!(matches!(
        &sent[0],
        ClientMessage::InitializeStream { call_id, language, model }
            if call_id == CALL && language == "en" && model == "nova-2"
    ));
    assert!(matches!(&sent[1], ClientMessage::StartTranscription { call_id } if call_id == CALL));
    assert!(h.coordinator.has_processor(CALL));
    assert_eq!(h.coordinator.is_capturing(CALL), Some(true));
    assert_eq!(h.coordinator.active_processors(), 1);

    // Starting again is a no-op
    h.coordinator
        .start_processor(CALL, h.transport.clone(), "en")
        .await
        .unwrap();
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test]
async fn test_start_without_language_uses_default() {
    let mut config = fast_config();
    config.default_language = "es".to_string();
    let h = Harness::new(config, None);
    h.coordinator
        .start_processor(CALL, h.transport.clone(), "")
        .await
        .unwrap();

    let params = h.transport.params.lock().clone().unwrap();
    assert_eq!(params.language, "es");
    assert_eq!(h.coordinator.language_state(CALL).unwrap().code, "es");
}

#[tokio::test]
async fn test_start_fails_when_stream_cannot_open() {
    let h = Harness::new(fast_config(), None);
    h.transport.set_fail_connect(true);

    let result = h
        .coordinator
        .start_processor(CALL, h.transport.clone(), "en")
        .await;
    assert!(matches!(result, Err(SpeechError::Transport(_))));
    assert!(!h.coordinator.has_processor(CALL));
}

#[tokio::test]
async fn test_stop_processor_closes_stream() {
    let h = Harness::started(fast_config(), None).await;

    assert!(h.coordinator.stop_processor(CALL).await);
    assert!(!h.coordinator.has_processor(CALL));
    assert_eq!(
        h.transport
            .disconnects
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert!(!h.coordinator.stop_processor(CALL).await);
}

#[tokio::test]
async fn test_unknown_call_has_no_processor() {
    let h = Harness::new(fast_config(), None);
    let result = h
        .coordinator
        .process_agent_message("missing", "hello", None)
        .await;
    assert!(matches!(result, Err(SpeechError::NoActiveProcessor(_))));
    assert!(matches!(
        h.coordinator.interrupt_speech("missing"),
        Err(SpeechError::NoActiveProcessor(_))
    ));
}

// =============================================================================
// Capture suspension
// =============================================================================

#[tokio::test]
async fn test_agent_speech_suspends_then_resumes_capture() {
    let h = Harness::started(fast_config(), None).await;

    let utterance = h
        .coordinator
        .process_agent_message(CALL, "Hello, how can I help?", None)
        .await
        .unwrap();
    assert_eq!(utterance.language, "en");
    assert_eq!(h.transport.capture_commands(), vec![true, false]);
    assert_eq!(h.coordinator.is_capturing(CALL), Some(false));

    // The stop is sent before the agent message
    let sent = h.transport.sent();
    let stop = sent
        .iter()
        .position(|m| matches!(m, ClientMessage::StopTranscription { .. }))
        .unwrap();
    let agent = sent
        .iter()
        .position(|m| matches!(m, ClientMessage::AgentMessage { .. }))
        .unwrap();
    assert!(stop < agent);

    h.final_audio(320);
    assert!(wait_for(WAIT, || h.sink.played() == vec![(CALL.to_string(), 320)]).await);
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
    assert_eq!(h.coordinator.is_capturing(CALL), Some(true));
}

#[tokio::test]
async fn test_capture_not_resumed_before_settling_delay() {
    let h = Harness::started(
        SpeechConfig {
            capture_resume_delay: Duration::from_millis(400),
            ..fast_config()
        },
        None,
    )
    .await;

    h.coordinator
        .process_agent_message(CALL, "One moment please.", None)
        .await
        .unwrap();
    h.final_audio(160);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.transport.capture_commands(), vec![true, false]);
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
}

#[tokio::test]
async fn test_newer_speech_supersedes_pending_resume() {
    let h = Harness::started(fast_config(), None).await;

    h.coordinator
        .process_agent_message(CALL, "First.", None)
        .await
        .unwrap();
    h.final_audio(160);
    // Give the consumer a moment to schedule the resume, then speak again
    assert!(wait_for(WAIT, || !h.sink.played().is_empty()).await);
    h.coordinator
        .process_agent_message(CALL, "Second.", None)
        .await
        .unwrap();

    tokio::time::sleep(RESUME_DELAY * 3).await;
    // Only one stop: capture was already suspended for the second message
    assert_eq!(h.transport.capture_commands(), vec![true, false]);

    h.final_audio(160);
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
}

#[tokio::test]
async fn test_customer_audio_dropped_while_suspended() {
    let h = Harness::started(fast_config(), None).await;

    assert!(
        h.coordinator
            .forward_customer_audio(CALL, Bytes::from_static(&[0, 1, 2, 3]))
            .await
            .unwrap()
    );
    assert_eq!(
        h.transport
            .count_sent(|m| matches!(m, ClientMessage::CustomerAudio { .. })),
        1
    );

    h.coordinator
        .process_agent_message(CALL, "Please hold.", None)
        .await
        .unwrap();
    assert!(
        !h.coordinator
            .forward_customer_audio(CALL, Bytes::from_static(&[0, 1, 2, 3]))
            .await
            .unwrap()
    );
    assert_eq!(
        h.transport
            .count_sent(|m| matches!(m, ClientMessage::CustomerAudio { .. })),
        1
    );
}

#[tokio::test]
async fn test_undelivered_agent_message_reports_and_resumes() {
    let h = Harness::started(fast_config(), None).await;
    h.transport.set_fail_agent_messages(true);

    let result = h
        .coordinator
        .process_agent_message(CALL, "Are you still there?", None)
        .await;
    assert!(matches!(result, Err(SpeechError::SynthesisFailed(_))));
    assert!(h.has_event(|e| matches!(e, SpeechEvent::SynthesisFailed { call_id, .. } if call_id == CALL)));
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
}

#[tokio::test]
async fn test_playback_failure_reports_and_resumes() {
    let h = Harness::started(fast_config(), None).await;
    h.sink.set_fail(true);

    h.coordinator
        .process_agent_message(CALL, "Your balance is ten dollars.", None)
        .await
        .unwrap();
    h.transport.emit_message(ServerMessage::AgentTtsAudio {
        audio: BASE64_STANDARD.encode([1u8; 16]),
        chunk_index: Some(0),
        is_final: false,
    });

    assert!(h.wait_event(|e| matches!(e, SpeechEvent::SynthesisFailed { .. })).await);
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
}

#[tokio::test]
async fn test_empty_agent_text_rejected() {
    let h = Harness::started(fast_config(), None).await;
    let result = h.coordinator.process_agent_message(CALL, "   ", None).await;
    assert!(matches!(result, Err(SpeechError::InvalidInput(_))));
    assert_eq!(h.transport.capture_commands(), vec![true]);
}

#[tokio::test]
async fn test_backend_error_resumes_capture() {
    let h = Harness::started(fast_config(), None).await;
    h.coordinator
        .process_agent_message(CALL, "Checking that now.", None)
        .await
        .unwrap();

    h.transport.emit_message(ServerMessage::Error {
        message: "tts engine unavailable".to_string(),
        code: Some("tts_error".to_string()),
    });

    assert!(
        h.wait_event(|e| matches!(
            e,
            SpeechEvent::BackendError { message, .. } if message == "tts engine unavailable"
        ))
        .await
    );
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
}

// =============================================================================
// Transcripts and language
// =============================================================================

#[tokio::test]
async fn test_language_confidence_is_monotonic() {
    let h = Harness::started(fast_config(), None).await;

    h.transport.transcript("hello there", true, Some(("en", 0.5)));
    h.transport.transcript("hola", true, Some(("es", 0.4)));
    assert!(
        h.wait_event(|e| matches!(e, SpeechEvent::Transcript { text, .. } if text == "hola"))
            .await
    );

    let state = h.coordinator.language_state(CALL).unwrap();
    assert_eq!(state.code, "en");
    assert_eq!(state.confidence, 0.5);
    assert!(!state.locked);

    let detections: Vec<_> = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, SpeechEvent::LanguageDetected { .. }))
        .collect();
    assert_eq!(detections.len(), 1);
}

#[tokio::test]
async fn test_confident_switch_then_lock() {
    let h = Harness::started(fast_config(), None).await;

    h.transport.transcript("hello", true, Some(("en", 0.8)));
    // Lower than the current confidence, but above the switch threshold
    h.transport.transcript("hola", true, Some(("es", 0.75)));
    h.transport.transcript("gracias", true, Some(("es", 0.9)));
    // Locked at 0.9, further detections are suppressed
    h.transport.transcript("merci", true, Some(("fr", 0.99)));
    assert!(
        h.wait_event(|e| matches!(e, SpeechEvent::Transcript { text, .. } if text == "merci"))
            .await
    );

    let state = h.coordinator.language_state(CALL).unwrap();
    assert_eq!(state.code, "es");
    assert!(state.locked);
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::LanguageDetected { language, locked: true, .. } if language == "es"
    )));

    // Agent speech follows the detected language unless overridden
    let utterance = h
        .coordinator
        .process_agent_message(CALL, "Claro.", None)
        .await
        .unwrap();
    assert_eq!(utterance.language, "es");
    let utterance = h
        .coordinator
        .process_agent_message(CALL, "Of course.", Some("en"))
        .await
        .unwrap();
    assert_eq!(utterance.language, "en");

    let reset = h.coordinator.reset_language(CALL).unwrap();
    assert!(!reset.locked);
    h.transport.transcript("bonjour", true, Some(("fr", 0.6)));
    assert!(
        wait_for(WAIT, || h
            .coordinator
            .language_state(CALL)
            .is_some_and(|s| s.code == "fr"))
        .await
    );
}

#[tokio::test]
async fn test_language_event_precedes_transcript() {
    let h = Harness::started(fast_config(), None).await;

    h.transport.transcript("bonjour", true, Some(("fr", 0.6)));
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::Transcript { .. })).await);

    let events = h.events();
    let detected = events
        .iter()
        .position(|e| matches!(e, SpeechEvent::LanguageDetected { .. }))
        .unwrap();
    let transcript = events
        .iter()
        .position(|e| matches!(e, SpeechEvent::Transcript { .. }))
        .unwrap();
    assert!(detected < transcript);
}

#[tokio::test]
async fn test_transcripts_delivered_in_order() {
    let h = Harness::started(fast_config(), None).await;

    h.transport.transcript("I", false, None);
    h.transport.transcript("I need", false, None);
    h.transport.transcript("", false, None);
    h.transport.transcript("I need help", true, None);
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::Transcript { is_final: true, .. })).await);

    let texts: Vec<(String, bool)> = h
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SpeechEvent::Transcript { text, is_final, .. } => Some((text, is_final)),
            _ => None,
        })
        .collect();
    assert_eq!(
        texts,
        vec![
            ("I".to_string(), false),
            ("I need".to_string(), false),
            ("I need help".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn test_backend_notifications_forwarded() {
    let h = Harness::started(fast_config(), None).await;

    h.transport
        .emit_message(ServerMessage::ConnectionConfirmed { session_id: None });
    h.transport.emit_message(ServerMessage::AgentTranscript {
        text: "Hi there".to_string(),
        language: None,
    });
    h.transport.emit_message(ServerMessage::CallStatusUpdate {
        status: "completed".to_string(),
        message: None,
    });

    assert!(
        h.wait_event(|e| matches!(e, SpeechEvent::StatusUpdate { status, .. } if status == "completed"))
            .await
    );
    assert!(h.has_event(|e| matches!(e, SpeechEvent::StreamOpened { .. })));
    assert!(h.has_event(|e| matches!(e, SpeechEvent::AgentTranscript { text, .. } if text == "Hi there")));
}

// =============================================================================
// Long-form speech
// =============================================================================

fn expected_chunks() -> Vec<String> {
    TextChunker::new(fast_config().max_chunk_chars).split(LONG_TEXT)
}

#[tokio::test]
async fn test_long_form_plays_chunks_in_order() {
    let synth = Arc::new(MockSynthesizer::new());
    let h = Harness::started(fast_config(), Some(synth.clone())).await;
    let chunks = expected_chunks();
    assert!(chunks.len() >= 3);

    let handle = h
        .coordinator
        .speak_long_form(CALL, LONG_TEXT, None)
        .await
        .unwrap();
    assert_eq!(handle.total_chunks, chunks.len());
    assert_eq!(handle.start_index, 0);

    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })).await);
    assert_eq!(synth.texts(), chunks);
    assert_eq!(h.sink.played().len(), chunks.len());
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::LongFormCompleted { completed, failed, .. }
            if *completed == chunks.len() && failed.is_empty()
    )));
    assert!(synth.requests().iter().all(|r| r.language == "en"));

    // Capture was suspended for the whole session and resumes afterwards
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true, false, true]).await);
    assert!(h.coordinator.long_form_session(CALL).is_none());
}

#[tokio::test]
async fn test_long_form_skips_chunk_after_retries() {
    let synth = Arc::new(MockSynthesizer::new());
    let h = Harness::started(fast_config(), Some(synth.clone())).await;
    let chunks = expected_chunks();
    synth.fail_text(&chunks[1]);

    h.coordinator
        .speak_long_form(CALL, LONG_TEXT, None)
        .await
        .unwrap();
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })).await);

    // One attempt plus two retries
    let attempts = synth.texts().iter().filter(|t| **t == chunks[1]).count();
    assert_eq!(attempts, 3);
    assert_eq!(h.sink.played().len(), chunks.len() - 1);
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::LongFormCompleted { completed, failed, .. }
            if *completed == chunks.len() - 1 && *failed == vec![1]
    )));
}

#[tokio::test]
async fn test_long_form_over_stream_retries_send() {
    let h = Harness::started(fast_config(), None).await;
    let chunks = expected_chunks();
    h.transport.fail_next_agent_messages(1);

    h.coordinator
        .speak_long_form(CALL, LONG_TEXT, Some("en"))
        .await
        .unwrap();
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })).await);

    assert_eq!(h.transport.agent_texts(), chunks);
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::LongFormCompleted { failed, .. } if failed.is_empty()
    )));
}

#[tokio::test]
async fn test_long_form_over_stream_waits_for_chunk_audio() {
    let h = Harness::started(fast_config(), None).await;
    h.transport.set_auto_play_chunks(false);
    let chunks = expected_chunks();

    let handle = h
        .coordinator
        .speak_long_form(CALL, LONG_TEXT, None)
        .await
        .unwrap();
    assert_eq!(handle.language, "en");

    for (i, chunk) in chunks.iter().enumerate() {
        assert!(wait_for(WAIT, || h.transport.agent_texts().len() == i + 1).await);
        if i == 0 {
            // Audio for some other chunk does not complete this one
            h.transport.finish_chunk(7);
        }

        // Until this chunk's audio ends, nothing else is spoken and capture
        // stays suspended
        tokio::time::sleep(RESUME_DELAY * 2).await;
        assert_eq!(h.transport.agent_texts().len(), i + 1);
        assert_eq!(h.transport.agent_texts().last(), Some(chunk));
        assert_eq!(h.coordinator.is_capturing(CALL), Some(false));
        assert!(!h.has_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })));

        h.transport.finish_chunk(i as u32);
    }

    let indexes: Vec<Option<u32>> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            ClientMessage::AgentMessage { chunk_index, .. } => Some(chunk_index),
            _ => None,
        })
        .collect();
    let expected: Vec<Option<u32>> = (0..chunks.len() as u32).map(Some).collect();
    assert_eq!(indexes, expected);

    assert!(
        h.wait_event(|e| matches!(
            e,
            SpeechEvent::LongFormCompleted { failed, .. } if failed.is_empty()
        ))
        .await
    );
    assert!(wait_for(WAIT, || h.coordinator.is_capturing(CALL) == Some(true)).await);
    assert_eq!(h.transport.capture_commands(), vec![true, false, true]);
}

#[tokio::test]
async fn test_long_form_chunk_without_audio_times_out() {
    let h = Harness::started(
        SpeechConfig {
            chunk_playback_timeout: Duration::from_millis(50),
            chunk_max_retries: 1,
            ..fast_config()
        },
        None,
    )
    .await;
    h.transport.set_auto_play_chunks(false);
    let chunks = expected_chunks();

    h.coordinator
        .speak_long_form(CALL, LONG_TEXT, None)
        .await
        .unwrap();
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })).await);

    // One attempt plus one retry per chunk
    assert_eq!(h.transport.agent_texts().len(), chunks.len() * 2);
    let all: Vec<usize> = (0..chunks.len()).collect();
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::LongFormCompleted { completed: 0, failed, .. } if *failed == all
    )));
    assert!(wait_for(WAIT, || h.coordinator.is_capturing(CALL) == Some(true)).await);
}

#[tokio::test]
async fn test_long_form_interrupt_and_resume() {
    let synth = Arc::new(MockSynthesizer::with_delay(Duration::from_millis(60)));
    let h = Harness::started(fast_config(), Some(synth.clone())).await;
    let chunks = expected_chunks();

    h.coordinator
        .speak_long_form(CALL, LONG_TEXT, None)
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator.speak_long_form(CALL, LONG_TEXT, None).await,
        Err(SpeechError::SpeechInProgress(_))
    ));

    assert!(wait_for(WAIT, || !synth.texts().is_empty()).await);
    assert!(h.coordinator.interrupt_speech(CALL).unwrap());
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormInterrupted { .. })).await);

    let session = h.coordinator.long_form_session(CALL).unwrap();
    assert!(session.resumable);
    assert!(!session.running);
    assert!(session.next_index < chunks.len());
    assert!(!h.coordinator.interrupt_speech(CALL).unwrap());

    let handle = h.coordinator.resume_long_form(CALL).await.unwrap();
    assert_eq!(handle.start_index, session.next_index);
    assert_eq!(handle.session_id, session.id);

    assert!(h.wait_event(|e| matches!(e, SpeechEvent::LongFormCompleted { .. })).await);
    // Every chunk rendered once, in order, across both runs
    assert_eq!(synth.texts(), chunks);

    assert!(matches!(
        h.coordinator.resume_long_form(CALL).await,
        Err(SpeechError::NoResumableSession(_))
    ));
}

#[tokio::test]
async fn test_long_form_rejects_empty_text() {
    let h = Harness::started(fast_config(), Some(Arc::new(MockSynthesizer::new()))).await;
    assert!(matches!(
        h.coordinator.speak_long_form(CALL, " \n ", None).await,
        Err(SpeechError::InvalidInput(_))
    ));
    assert!(matches!(
        h.coordinator.resume_long_form(CALL).await,
        Err(SpeechError::NoResumableSession(_))
    ));
}

// =============================================================================
// Stream recovery and idle cleanup
// =============================================================================

#[tokio::test]
async fn test_reconnect_restarts_capture() {
    let h = Harness::started(fast_config(), None).await;
    h.transport.clear_sent();

    h.transport.emit(TransportEvent::Reconnected { attempt: 2 });
    assert!(
        h.wait_event(|e| matches!(e, SpeechEvent::StreamRestored { attempt: 2, .. }))
            .await
    );
    assert!(wait_for(WAIT, || h.transport.capture_commands() == vec![true]).await);
}

#[tokio::test]
async fn test_reconnect_exhausted_reports_stream_lost() {
    let h = Harness::started(fast_config(), None).await;

    h.transport
        .emit(TransportEvent::ReconnectExhausted { attempts: 5 });
    assert!(
        h.wait_event(|e| matches!(
            e,
            SpeechEvent::StreamLost { reason, .. } if reason.contains('5')
        ))
        .await
    );
}

#[tokio::test]
async fn test_idle_processor_swept() {
    let h = Harness::started(
        SpeechConfig {
            idle_timeout: Duration::from_millis(50),
            ..fast_config()
        },
        None,
    )
    .await;
    assert!(h.coordinator.sweep_idle().await.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.coordinator.sweep_idle().await, vec![CALL.to_string()]);
    assert!(!h.coordinator.has_processor(CALL));
    assert!(h.has_event(|e| matches!(
        e,
        SpeechEvent::ProcessorStopped { reason, .. } if reason == "idle"
    )));
}

#[tokio::test]
async fn test_activity_keeps_processor_alive() {
    let h = Harness::started(
        SpeechConfig {
            idle_timeout: Duration::from_millis(150),
            ..fast_config()
        },
        None,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.transport.transcript("still here", true, None);
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::Transcript { .. })).await);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(h.coordinator.sweep_idle().await.is_empty());
    assert!(h.coordinator.has_processor(CALL));
    assert!(h.synthesizer.is_none());
}

#[tokio::test]
async fn test_backend_notifications_count_as_activity() {
    let h = Harness::started(
        SpeechConfig {
            idle_timeout: Duration::from_millis(150),
            ..fast_config()
        },
        None,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.transport.emit_message(ServerMessage::AgentTranscript {
        text: "One moment".to_string(),
        language: None,
    });
    h.transport.emit_message(ServerMessage::CallStatusUpdate {
        status: "in_progress".to_string(),
        message: None,
    });
    assert!(h.wait_event(|e| matches!(e, SpeechEvent::StatusUpdate { .. })).await);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(h.coordinator.sweep_idle().await.is_empty());
    assert!(h.coordinator.has_processor(CALL));
}
