//! Per-call audio streams between the carrier media socket and the speech
//! pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::base::{AudioError, AudioResult, PlaybackSink, StreamStats};
use super::codec::{AudioCodec, create_codec, pcm_from_le_bytes, pcm_to_le_bytes};
use super::gate::SilenceGate;

/// Audio bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Carrier encoding: "mulaw" or "linear16"
    pub codec: String,
    /// Carrier sample rate (ignored by fixed-rate codecs)
    pub sample_rate: u32,
    /// Normalized RMS level below which inbound frames are silence
    pub silence_threshold: f32,
    /// Frames still forwarded after the last speech frame
    pub hangover_frames: u32,
    /// Duration of one outbound carrier frame
    pub frame_duration_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: "mulaw".to_string(),
            sample_rate: 8000,
            silence_threshold: 0.01,
            hangover_frames: 10,
            frame_duration_ms: 20,
        }
    }
}

#[derive(Default)]
struct StreamCounters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
    played: AtomicU64,
}

impl StreamCounters {
    fn snapshot(&self) -> StreamStats {
        StreamStats {
            forwarded_frames: self.forwarded.load(Ordering::Relaxed),
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            played_frames: self.played.load(Ordering::Relaxed),
        }
    }
}

struct AudioStream {
    gate: Mutex<SilenceGate>,
    output: Mutex<Option<mpsc::Sender<Bytes>>>,
    counters: StreamCounters,
}

/// Converts and gates carrier audio for every active call.
pub struct AudioBridge {
    config: AudioConfig,
    codec: Arc<dyn AudioCodec>,
    streams: DashMap<String, Arc<AudioStream>>,
}

impl AudioBridge {
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let codec = create_codec(&config.codec, config.sample_rate)?;
        Ok(Self {
            config,
            codec,
            streams: DashMap::new(),
        })
    }

    pub fn codec(&self) -> &dyn AudioCodec {
        self.codec.as_ref()
    }

    /// Samples in one outbound carrier frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.codec.sample_rate() as usize * self.config.frame_duration_ms as usize / 1000).max(1)
    }

    /// Start a stream for a call. Returns false if one is already active.
    pub fn start_stream(&self, call_id: &str) -> bool {
        if self.streams.contains_key(call_id) {
            return false;
        }
        let stream = AudioStream {
            gate: Mutex::new(SilenceGate::new(
                self.config.silence_threshold,
                self.config.hangover_frames,
            )),
            output: Mutex::new(None),
            counters: StreamCounters::default(),
        };
        self.streams.insert(call_id.to_string(), Arc::new(stream));
        tracing::debug!(call_id = %call_id, codec = self.codec.name(), "Audio stream started");
        true
    }

    /// Stop a call's stream, returning its final counters. Safe to repeat.
    pub fn stop_stream(&self, call_id: &str) -> Option<StreamStats> {
        let (_, stream) = self.streams.remove(call_id)?;
        let stats = stream.counters.snapshot();
        tracing::debug!(
            call_id = %call_id,
            forwarded = stats.forwarded_frames,
            dropped = stats.dropped_frames,
            played = stats.played_frames,
            "Audio stream stopped"
        );
        Some(stats)
    }

    pub fn is_active(&self, call_id: &str) -> bool {
        self.streams.contains_key(call_id)
    }

    pub fn stats(&self, call_id: &str) -> Option<StreamStats> {
        self.streams.get(call_id).map(|s| s.counters.snapshot())
    }

    /// Attach the carrier-bound output for agent playback.
    pub fn attach_carrier_output(
        &self,
        call_id: &str,
        output: mpsc::Sender<Bytes>,
    ) -> AudioResult<()> {
        let stream = self.stream(call_id)?;
        *stream.output.lock() = Some(output);
        Ok(())
    }

    pub fn detach_carrier_output(&self, call_id: &str) {
        if let Some(stream) = self.streams.get(call_id) {
            stream.output.lock().take();
        }
    }

    /// Decode and gate one inbound carrier frame.
    ///
    /// Returns the frame as linear PCM (little-endian bytes) when it should be
    /// forwarded to transcription, `None` when it was dropped as silence.
    pub fn process_inbound(&self, call_id: &str, frame: &[u8]) -> AudioResult<Option<Bytes>> {
        let stream = self.stream(call_id)?;
        let samples = self.codec.decode(frame)?;

        if stream.gate.lock().process(&samples).forwards() {
            stream.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            Ok(Some(pcm_to_le_bytes(&samples)))
        } else {
            stream.counters.dropped.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    fn stream(&self, call_id: &str) -> AudioResult<Arc<AudioStream>> {
        self.streams
            .get(call_id)
            .map(|s| s.clone())
            .ok_or_else(|| AudioError::StreamNotFound(call_id.to_string()))
    }
}

#[async_trait]
impl PlaybackSink for AudioBridge {
    /// Encode agent audio and deliver it to the carrier in fixed-duration
    /// frames. Audio for a stream without an attached output is discarded.
    async fn play(&self, call_id: &str, pcm: Bytes) -> AudioResult<usize> {
        let stream = self.stream(call_id)?;
        let samples = pcm_from_le_bytes(&pcm)?;

        let Some(output) = stream.output.lock().clone() else {
            tracing::debug!(call_id = %call_id, "No carrier output attached, discarding playback");
            return Ok(0);
        };

        let mut delivered = 0;
        for frame in samples.chunks(self.samples_per_frame()) {
            let encoded = Bytes::from(self.codec.encode(frame));
            if output.send(encoded).await.is_err() {
                stream.output.lock().take();
                return Err(AudioError::OutputClosed(call_id.to_string()));
            }
            delivered += 1;
        }

        stream
            .counters
            .played
            .fetch_add(delivered as u64, Ordering::Relaxed);
        Ok(delivered)
    }
}
