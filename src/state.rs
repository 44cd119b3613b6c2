//! Shared application state.
//!
//! Wires the configured collaborators into the call manager and owns the
//! background maintenance tasks.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::audio::{AudioBridge, AudioError, PlaybackSink};
use crate::core::call::{
    CallManager, CallServices, CarrierControl, HttpCarrierControl, LoggingCarrierControl,
};
use crate::core::diagnostics::DiagnosticsRecorder;
use crate::core::persistence::{CallRecordStore, HttpCallRecordStore, NoopCallRecordStore};
use crate::core::routing::RoutingError;
use crate::core::speech::{HttpSynthesizer, SpeechCoordinator, SpeechError, SpeechSynthesizer};
use crate::core::transport::{TransportFactory, WebSocketTransportFactory};
use crate::core::voice_config::VoiceConfigCache;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Audio bridge setup failed: {0}")]
    Audio(#[from] AudioError),

    #[error("Synthesizer setup failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Routing table setup failed: {0}")]
    Routing(#[from] RoutingError),
}

/// External collaborators of the call manager.
///
/// [`Collaborators::from_config`] builds the production set; tests swap in
/// mocks.
pub struct Collaborators {
    pub transports: Arc<dyn TransportFactory>,
    pub store: Arc<dyn CallRecordStore>,
    pub carrier: Arc<dyn CarrierControl>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl Collaborators {
    pub fn from_config(config: &ServerConfig) -> Result<Self, StateError> {
        let transports: Arc<dyn TransportFactory> =
            Arc::new(WebSocketTransportFactory::new(config.transport.clone()));

        let store: Arc<dyn CallRecordStore> = match &config.backend.url {
            Some(url) => Arc::new(HttpCallRecordStore::new(
                url.clone(),
                config.backend.api_key.clone(),
                config.backend.timeout,
            )),
            None => {
                info!("BACKEND_URL not set, call records will not be persisted");
                Arc::new(NoopCallRecordStore)
            }
        };

        let carrier: Arc<dyn CarrierControl> = match &config.carrier.url {
            Some(url) => Arc::new(HttpCarrierControl::new(
                url.clone(),
                config.carrier.api_key.clone(),
                config.carrier.timeout,
            )),
            None => {
                info!("CARRIER_URL not set, carrier instructions will only be logged");
                Arc::new(LoggingCarrierControl)
            }
        };

        let synthesizer = match &config.synthesizer {
            Some(synth) => Some(Arc::new(HttpSynthesizer::new(synth.clone())?)
                as Arc<dyn SpeechSynthesizer>),
            None => None,
        };

        Ok(Self {
            transports,
            store,
            carrier,
            synthesizer,
        })
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub calls: Arc<CallManager>,
    pub speech: Arc<SpeechCoordinator>,
    pub audio: Arc<AudioBridge>,
    pub diagnostics: Arc<DiagnosticsRecorder>,
    pub voice: Arc<VoiceConfigCache>,
    pub started_at: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Build the state with production collaborators.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(
        config: ServerConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, StateError> {
        let diagnostics = Arc::new(DiagnosticsRecorder::new(config.diagnostics.clone()));
        let voice = Arc::new(VoiceConfigCache::new(config.voice.clone()));
        let audio = Arc::new(AudioBridge::new(config.audio.clone())?);
        let playback: Arc<dyn PlaybackSink> = audio.clone();
        let speech = Arc::new(SpeechCoordinator::new(
            config.speech.clone(),
            playback,
            collaborators.synthesizer,
            voice.clone(),
        ));
        let router = config.router()?;
        info!(rules = router.len(), "Routing table loaded");

        let calls = CallManager::new(
            config.call.clone(),
            CallServices {
                router,
                transports: collaborators.transports,
                speech: speech.clone(),
                audio: audio.clone(),
                store: collaborators.store,
                carrier: collaborators.carrier,
                diagnostics: diagnostics.clone(),
            },
        );

        Ok(Arc::new(Self {
            config,
            calls,
            speech,
            audio,
            diagnostics,
            voice,
            started_at: Instant::now(),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the periodic sweeps: terminal call archiving, idle processor
    /// shutdown and diagnostics auto-resolve/prune.
    pub fn spawn_maintenance(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.calls.spawn_maintenance());
        tasks.push(self.speech.spawn_idle_sweeper());
        tasks.push(self.diagnostics.spawn_maintenance());
    }

    /// Stop the maintenance tasks.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
