/// Energy gate that drops silent frames before they reach transcription.
///
/// A frame passes when its RMS level is at or above `threshold`. After the
/// last loud frame, `hangover_frames` further frames are still forwarded so
/// trailing syllables and short pauses are not clipped.
#[derive(Debug, Clone)]
pub struct SilenceGate {
    /// Normalized RMS threshold in [0, 1]
    threshold: f32,
    hangover_frames: u32,
    remaining_hangover: u32,
}

/// Outcome of gating one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Frame is above the threshold
    Speech,
    /// Frame is silent but inside the hangover window
    Hangover,
    /// Frame is silent and dropped
    Drop,
}

impl GateDecision {
    pub fn forwards(&self) -> bool {
        !matches!(self, GateDecision::Drop)
    }
}

impl SilenceGate {
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            hangover_frames,
            remaining_hangover: 0,
        }
    }

    pub fn process(&mut self, samples: &[i16]) -> GateDecision {
        if rms(samples) >= self.threshold {
            self.remaining_hangover = self.hangover_frames;
            GateDecision::Speech
        } else if self.remaining_hangover > 0 {
            self.remaining_hangover -= 1;
            GateDecision::Hangover
        } else {
            GateDecision::Drop
        }
    }

    pub fn reset(&mut self) {
        self.remaining_hangover = 0;
    }
}

/// Normalized root-mean-square level of a frame, in [0, 1].
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud() -> Vec<i16> {
        (0..160).map(|i| if i % 2 == 0 { 8000 } else { -8000 }).collect()
    }

    fn quiet() -> Vec<i16> {
        vec![3; 160]
    }

    #[test]
    fn test_rms_levels() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0; 160]), 0.0);
        let level = rms(&loud());
        assert!((level - 8000.0 / 32768.0).abs() < 1e-4);
    }

    #[test]
    fn test_silence_dropped_without_prior_speech() {
        let mut gate = SilenceGate::new(0.01, 3);
        assert_eq!(gate.process(&quiet()), GateDecision::Drop);
    }

    #[test]
    fn test_hangover_after_speech() {
        let mut gate = SilenceGate::new(0.01, 2);
        assert_eq!(gate.process(&loud()), GateDecision::Speech);
        assert_eq!(gate.process(&quiet()), GateDecision::Hangover);
        assert_eq!(gate.process(&quiet()), GateDecision::Hangover);
        assert_eq!(gate.process(&quiet()), GateDecision::Drop);

        // Speech re-arms the hangover
        assert_eq!(gate.process(&loud()), GateDecision::Speech);
        assert!(gate.process(&quiet()).forwards());
    }

    #[test]
    fn test_reset_clears_hangover() {
        let mut gate = SilenceGate::new(0.01, 5);
        gate.process(&loud());
        gate.reset();
        assert_eq!(gate.process(&quiet()), GateDecision::Drop);
    }
}
