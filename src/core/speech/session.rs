use serde::Serialize;
use uuid::Uuid;

/// Progress of one long-form synthesis request.
///
/// Chunks play strictly in order. `next_index` only moves forward: a chunk is
/// either played (`completed` grows) or skipped after exhausting its retries
/// (`failed` records it).
#[derive(Debug, Clone, Serialize)]
pub struct TtsSession {
    pub id: String,
    pub chunks: Vec<String>,
    /// Next chunk to play
    pub next_index: usize,
    /// Index of the last chunk that played successfully
    pub last_played: Option<usize>,
    pub completed: usize,
    pub failed: Vec<usize>,
    /// Set when playback was interrupted before the last chunk
    pub resumable: bool,
    /// A playback task is currently driving this session
    #[serde(skip)]
    pub running: bool,
}

impl TtsSession {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chunks,
            next_index: 0,
            last_played: None,
            completed: 0,
            failed: Vec::new(),
            resumable: false,
            running: false,
        }
    }

    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_finished(&self) -> bool {
        self.next_index >= self.chunks.len()
    }

    /// The next chunk to play, with its index.
    pub fn next_chunk(&self) -> Option<(usize, &str)> {
        self.chunks
            .get(self.next_index)
            .map(|c| (self.next_index, c.as_str()))
    }

    pub fn mark_played(&mut self, index: usize) {
        if index != self.next_index {
            return;
        }
        self.last_played = Some(index);
        self.completed += 1;
        self.next_index += 1;
    }

    pub fn mark_failed(&mut self, index: usize) {
        if index != self.next_index {
            return;
        }
        self.failed.push(index);
        self.next_index += 1;
    }

    pub fn interrupt(&mut self) {
        self.running = false;
        self.resumable = !self.is_finished();
    }
}
