//! Bounded, queryable store of error records and log lines.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::types::{
    ErrorFilter, ErrorRecord, HealthReport, HealthStatus, LogFilter, LogLevel, LogLine, NewError,
    Severity,
};

/// Diagnostics recorder configuration.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Maximum number of error records kept
    pub max_errors: usize,
    /// Maximum number of log lines kept
    pub max_logs: usize,
    /// Low severity errors are marked resolved after this long
    pub auto_resolve_after: Duration,
    /// Records older than this are pruned (unresolved high/critical are kept)
    pub retention: Duration,
    /// Trailing window used for the error volume health signal
    pub health_window: Duration,
    /// Unresolved high-severity errors at or above this count make the
    /// system unhealthy
    pub unhealthy_high_threshold: usize,
    /// Error volume in the trailing window at or above this count degrades
    /// health
    pub degraded_volume_threshold: usize,
    /// Interval of the maintenance task (auto-resolve + prune)
    pub maintenance_interval: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_errors: 1000,
            max_logs: 5000,
            auto_resolve_after: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(60 * 60),
            health_window: Duration::from_secs(5 * 60),
            unhealthy_high_threshold: 5,
            degraded_volume_threshold: 10,
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

/// Error/diagnostics recorder.
///
/// All operations are infallible: recording a fault must never abort the
/// caller. Every record is mirrored to `tracing` at the level derived from
/// its severity.
pub struct DiagnosticsRecorder {
    config: DiagnosticsConfig,
    errors: RwLock<VecDeque<ErrorRecord>>,
    logs: RwLock<VecDeque<LogLine>>,
}

impl DiagnosticsRecorder {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self {
            config,
            errors: RwLock::new(VecDeque::new()),
            logs: RwLock::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Record an error. Returns the new record's id.
    pub fn record_error(&self, error: NewError) -> String {
        self.record_error_at(error, Utc::now())
    }

    pub(crate) fn record_error_at(&self, error: NewError, now: DateTime<Utc>) -> String {
        let record = ErrorRecord {
            id: Uuid::new_v4().to_string(),
            category: error.category,
            severity: error.severity,
            component: error.component,
            message: error.message,
            call_id: error.call_id,
            timestamp: now,
            resolved: false,
            resolved_at: None,
            context: error.context,
        };

        emit_error(&record);
        let id = record.id.clone();

        let mut errors = self.errors.write();
        errors.push_back(record);
        if errors.len() > self.config.max_errors {
            evict_one(&mut errors);
        }
        id
    }

    /// Record a log line.
    pub fn log(
        &self,
        level: LogLevel,
        component: &str,
        message: impl Into<String>,
        call_id: Option<&str>,
    ) {
        let line = LogLine {
            level,
            component: component.to_string(),
            message: message.into(),
            call_id: call_id.map(str::to_string),
            timestamp: Utc::now(),
        };

        match line.level {
            LogLevel::Debug => tracing::debug!(component = %line.component, call_id = ?line.call_id, "{}", line.message),
            LogLevel::Info => tracing::info!(component = %line.component, call_id = ?line.call_id, "{}", line.message),
            LogLevel::Warn => tracing::warn!(component = %line.component, call_id = ?line.call_id, "{}", line.message),
            LogLevel::Error => tracing::error!(component = %line.component, call_id = ?line.call_id, "{}", line.message),
        }

        let mut logs = self.logs.write();
        logs.push_back(line);
        while logs.len() > self.config.max_logs {
            logs.pop_front();
        }
    }

    /// Query error records, newest first.
    pub fn query_errors(&self, filter: &ErrorFilter) -> Vec<ErrorRecord> {
        let errors = self.errors.read();
        let iter = errors.iter().rev().filter(|r| filter.matches(r)).cloned();
        match filter.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Query log lines, newest first.
    pub fn query_logs(&self, filter: &LogFilter) -> Vec<LogLine> {
        let logs = self.logs.read();
        let iter = logs.iter().rev().filter(|l| filter.matches(l)).cloned();
        match filter.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    pub fn get_error(&self, id: &str) -> Option<ErrorRecord> {
        self.errors.read().iter().find(|r| r.id == id).cloned()
    }

    /// Mark an error resolved. Returns false if the id is unknown.
    pub fn resolve(&self, id: &str) -> bool {
        let mut errors = self.errors.write();
        match errors.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                if !record.resolved {
                    record.resolved = true;
                    record.resolved_at = Some(Utc::now());
                }
                true
            }
            None => false,
        }
    }

    /// Resolve every unresolved error attached to a call.
    pub fn resolve_for_call(&self, call_id: &str) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for record in self.errors.write().iter_mut() {
            if !record.resolved && record.call_id.as_deref() == Some(call_id) {
                record.resolved = true;
                record.resolved_at = Some(now);
                count += 1;
            }
        }
        count
    }

    /// Resolve low-severity errors older than the auto-resolve timeout.
    pub fn auto_resolve(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - to_chrono(self.config.auto_resolve_after);
        let mut count = 0;
        for record in self.errors.write().iter_mut() {
            if !record.resolved && record.severity == Severity::Low && record.timestamp <= cutoff {
                record.resolved = true;
                record.resolved_at = Some(now);
                count += 1;
            }
        }
        if count > 0 {
            tracing::debug!("Auto-resolved {} low severity errors", count);
        }
        count
    }

    /// Drop records older than the retention window. Unresolved high and
    /// critical errors are always retained.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - to_chrono(self.config.retention);

        let mut errors = self.errors.write();
        let before = errors.len();
        errors.retain(|r| r.timestamp > cutoff || (!r.resolved && r.severity.is_severe()));
        let pruned = before - errors.len();
        drop(errors);

        self.logs.write().retain(|l| l.timestamp > cutoff);

        if pruned > 0 {
            tracing::debug!("Pruned {} diagnostic error records", pruned);
        }
        pruned
    }

    /// Derive the current health status.
    pub fn health(&self) -> HealthReport {
        self.health_at(Utc::now())
    }

    pub fn health_at(&self, now: DateTime<Utc>) -> HealthReport {
        let window_start = now - to_chrono(self.config.health_window);
        let errors = self.errors.read();

        let mut unresolved_critical = 0;
        let mut unresolved_high = 0;
        let mut recent_errors = 0;
        for record in errors.iter() {
            if !record.resolved {
                match record.severity {
                    Severity::Critical => unresolved_critical += 1,
                    Severity::High => unresolved_high += 1,
                    _ => {}
                }
            }
            if record.timestamp >= window_start {
                recent_errors += 1;
            }
        }

        let status = if unresolved_critical > 0
            || unresolved_high >= self.config.unhealthy_high_threshold
        {
            HealthStatus::Unhealthy
        } else if unresolved_high > 0 || recent_errors >= self.config.degraded_volume_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            unresolved_critical,
            unresolved_high,
            recent_errors,
            total_errors: errors.len(),
            checked_at: now,
        }
    }

    /// Spawn the periodic auto-resolve + prune task.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.maintenance_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(recorder) = weak.upgrade() else {
                    break;
                };
                let now = Utc::now();
                recorder.auto_resolve(now);
                recorder.prune(now);
            }
        })
    }
}

impl Default for DiagnosticsRecorder {
    fn default() -> Self {
        Self::new(DiagnosticsConfig::default())
    }
}

/// Evict the oldest record that is not an unresolved high/critical error.
/// Falls back to the oldest record when everything is protected.
fn evict_one(errors: &mut VecDeque<ErrorRecord>) {
    let position = errors
        .iter()
        .position(|r| r.resolved || !r.severity.is_severe())
        .unwrap_or(0);
    errors.remove(position);
}

fn emit_error(record: &ErrorRecord) {
    match record.severity.log_level() {
        LogLevel::Debug => tracing::debug!(
            category = %record.category,
            component = %record.component,
            call_id = ?record.call_id,
            "{}",
            record.message
        ),
        LogLevel::Info => tracing::info!(
            category = %record.category,
            component = %record.component,
            call_id = ?record.call_id,
            "{}",
            record.message
        ),
        LogLevel::Warn => tracing::warn!(
            category = %record.category,
            component = %record.component,
            call_id = ?record.call_id,
            "{}",
            record.message
        ),
        LogLevel::Error => tracing::error!(
            category = %record.category,
            severity = %record.severity,
            component = %record.component,
            call_id = ?record.call_id,
            "{}",
            record.message
        ),
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
