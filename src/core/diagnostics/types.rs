use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fault taxonomy shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport unreachable or slow
    Connection,
    /// Expired or invalid credentials
    Authentication,
    /// Capture or playback failure
    Audio,
    /// Synthesis service failure
    Tts,
    /// Transcription service failure
    Stt,
    /// Invalid state transition or unknown call
    CallManagement,
    /// External carrier gateway failure
    Carrier,
    /// Missing routing rules or voice config
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Audio => "audio",
            ErrorCategory::Tts => "tts",
            ErrorCategory::Stt => "stt",
            ErrorCategory::CallManagement => "call_management",
            ErrorCategory::Carrier => "carrier",
            ErrorCategory::Configuration => "configuration",
        };
        write!(f, "{s}")
    }
}

/// Error severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Log level used when a record of this severity is mirrored to tracing.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Severity::Low => LogLevel::Info,
            Severity::Medium => LogLevel::Warn,
            Severity::High | Severity::Critical => LogLevel::Error,
        }
    }

    /// High and critical errors are never pruned while unresolved.
    pub fn is_severe(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured error record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Component that reported the error (e.g. "call_manager", "transport")
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

/// Input for a new error record.
#[derive(Debug, Clone)]
pub struct NewError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub component: String,
    pub message: String,
    pub call_id: Option<String>,
    pub context: serde_json::Value,
}

impl NewError {
    pub fn new(
        category: ErrorCategory,
        severity: Severity,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            component: component.into(),
            message: message.into(),
            call_id: None,
            context: serde_json::Value::Null,
        }
    }

    pub fn with_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// A diagnostic log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Filter over error records. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorFilter {
    #[serde(default)]
    pub category: Option<ErrorCategory>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ErrorFilter {
    pub fn matches(&self, record: &ErrorRecord) -> bool {
        self.category.is_none_or(|c| c == record.category)
            && self.severity.is_none_or(|s| s == record.severity)
            && self
                .component
                .as_deref()
                .is_none_or(|c| c == record.component)
            && self
                .call_id
                .as_deref()
                .is_none_or(|id| record.call_id.as_deref() == Some(id))
            && self.resolved.is_none_or(|r| r == record.resolved)
            && self.since.is_none_or(|t| record.timestamp >= t)
    }
}

/// Filter over log lines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, line: &LogLine) -> bool {
        // Level acts as a minimum
        self.level.is_none_or(|l| line.level >= l)
            && self
                .component
                .as_deref()
                .is_none_or(|c| c == line.component)
            && self
                .call_id
                .as_deref()
                .is_none_or(|id| line.call_id.as_deref() == Some(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Derived health summary.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub unresolved_critical: usize,
    pub unresolved_high: usize,
    /// Errors recorded within the trailing window
    pub recent_errors: usize,
    pub total_errors: usize,
    pub checked_at: DateTime<Utc>,
}
