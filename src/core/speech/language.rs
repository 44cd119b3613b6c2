use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence thresholds governing language updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LanguageThresholds {
    /// A different language replaces the current one above this confidence,
    /// even when the current confidence is higher
    pub switch_confidence: f32,
    /// Detections at or above this confidence lock the language
    pub lock_confidence: f32,
    pub auto_lock: bool,
}

impl Default for LanguageThresholds {
    fn default() -> Self {
        Self {
            switch_confidence: 0.7,
            lock_confidence: 0.85,
            auto_lock: true,
        }
    }
}

/// Per-call detected language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageState {
    pub code: String,
    pub confidence: f32,
    pub updated_at: Option<DateTime<Utc>>,
    pub locked: bool,
}

/// Result of feeding a detection into [`LanguageState::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageUpdate {
    /// The detection was applied
    Applied { changed_language: bool, locked: bool },
    /// Not confident enough to replace the current state
    Ignored,
    /// The state is locked
    Suppressed,
}

impl LanguageState {
    pub fn new(default_language: &str) -> Self {
        Self {
            code: default_language.to_string(),
            confidence: 0.0,
            updated_at: None,
            locked: false,
        }
    }

    /// Whether any detection has been applied yet.
    pub fn is_detected(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Apply a detection under the monotonic-confidence rule.
    ///
    /// A detection replaces the state when its confidence is strictly higher
    /// than the current one, or when it names a different language with a
    /// confidence above `switch_confidence`.
    pub fn observe(
        &mut self,
        code: &str,
        confidence: f32,
        thresholds: &LanguageThresholds,
        now: DateTime<Utc>,
    ) -> LanguageUpdate {
        if self.locked {
            return LanguageUpdate::Suppressed;
        }

        let confidence = confidence.clamp(0.0, 1.0);
        let different = !code.eq_ignore_ascii_case(&self.code);
        let accept = confidence > self.confidence
            || (different && confidence > thresholds.switch_confidence);
        if !accept {
            return LanguageUpdate::Ignored;
        }

        self.code = code.to_string();
        self.confidence = confidence;
        self.updated_at = Some(now);
        if thresholds.auto_lock && confidence >= thresholds.lock_confidence {
            self.locked = true;
        }

        LanguageUpdate::Applied {
            changed_language: different,
            locked: self.locked,
        }
    }

    /// Clear the lock and confidence so the next detection applies.
    pub fn reset(&mut self) {
        self.locked = false;
        self.confidence = 0.0;
        self.updated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(state: &mut LanguageState, code: &str, confidence: f32) -> LanguageUpdate {
        state.observe(code, confidence, &LanguageThresholds::default(), Utc::now())
    }

    #[test]
    fn test_lower_confidence_other_language_is_ignored() {
        let mut state = LanguageState::new("en");
        assert!(matches!(
            observe(&mut state, "en", 0.5),
            LanguageUpdate::Applied { changed_language: false, locked: false }
        ));
        assert_eq!(observe(&mut state, "es", 0.4), LanguageUpdate::Ignored);
        assert_eq!(state.code, "en");
        assert_eq!(state.confidence, 0.5);
    }

    #[test]
    fn test_higher_confidence_replaces() {
        let mut state = LanguageState::new("en");
        observe(&mut state, "en", 0.5);
        assert!(matches!(
            observe(&mut state, "es", 0.6),
            LanguageUpdate::Applied { changed_language: true, .. }
        ));
        assert_eq!(state.code, "es");
    }

    #[test]
    fn test_very_confident_switch_below_current() {
        let thresholds = LanguageThresholds {
            auto_lock: false,
            ..Default::default()
        };
        let mut state = LanguageState::new("en");
        state.observe("en", 0.8, &thresholds, Utc::now());

        // 0.75 < 0.8 but above the switch threshold for a different language
        let update = state.observe("fr", 0.75, &thresholds, Utc::now());
        assert!(matches!(update, LanguageUpdate::Applied { changed_language: true, .. }));
        assert_eq!(state.code, "fr");

        // Same language at lower confidence is not an update
        assert_eq!(
            state.observe("fr", 0.72, &thresholds, Utc::now()),
            LanguageUpdate::Ignored
        );
    }

    #[test]
    fn test_lock_suppresses_until_reset() {
        let mut state = LanguageState::new("en");
        assert!(matches!(
            observe(&mut state, "es", 0.9),
            LanguageUpdate::Applied { locked: true, .. }
        ));
        assert_eq!(observe(&mut state, "en", 0.99), LanguageUpdate::Suppressed);
        assert_eq!(state.code, "es");

        state.reset();
        assert!(!state.locked);
        assert!(matches!(observe(&mut state, "en", 0.3), LanguageUpdate::Applied { .. }));
        assert_eq!(state.code, "en");
    }

    #[test]
    fn test_auto_lock_disabled() {
        let thresholds = LanguageThresholds {
            auto_lock: false,
            ..Default::default()
        };
        let mut state = LanguageState::new("en");
        state.observe("de", 0.95, &thresholds, Utc::now());
        assert!(!state.locked);
    }
}
