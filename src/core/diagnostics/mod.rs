//! Error and diagnostics recording.
//!
//! Components report faults here instead of propagating them when the fault
//! is not the caller's concern (best-effort writes, stream loss, synthesis
//! failures). Operators read the records back through the diagnostics HTTP
//! endpoints, and the recorder derives an overall health status from them.

mod recorder;
mod types;

pub use recorder::{DiagnosticsConfig, DiagnosticsRecorder};
pub use types::{
    ErrorCategory, ErrorFilter, ErrorRecord, HealthReport, HealthStatus, LogFilter, LogLevel,
    LogLine, NewError, Severity,
};
