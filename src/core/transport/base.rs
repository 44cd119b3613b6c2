//! Base traits and types for the streaming transport to the speech backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::{ClientMessage, ServerMessage};
use crate::core::diagnostics::ErrorCategory;
use crate::core::events::Subscription;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the transport channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the stream did not complete within the connect timeout
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The channel is not connected
    #[error("Not connected")]
    NotConnected,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TransportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::AuthenticationFailed(_) => ErrorCategory::Authentication,
            TransportError::InvalidConfiguration(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Connection,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for automatic reconnection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    /// Enable automatic reconnection on abnormal close.
    /// Default: true
    pub enabled: bool,

    /// Maximum number of reconnection attempts before giving up.
    /// Must be at least 1 when reconnection is enabled.
    /// Default: 5
    pub max_attempts: u32,

    /// Base delay between reconnection attempts (milliseconds).
    /// Default: 1000ms
    pub initial_delay_ms: u64,

    /// Maximum delay between reconnection attempts (milliseconds).
    /// Default: 30000ms (30 seconds)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff, strictly greater than 1.
    /// Default: 2.0
    pub backoff_multiplier: f32,

    /// Whether to add jitter to the delay. Jitter only lengthens a delay and
    /// stays below the next step, so delays remain strictly increasing.
    /// Default: false
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl ReconnectionConfig {
    /// Create a config with reconnection disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay before reconnection attempt `attempt` (1-based), in milliseconds.
    ///
    /// `initial_delay_ms * multiplier^(attempt-1)`, capped at `max_delay_ms`.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base_delay = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base_delay * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        if self.jitter {
            // Below half a backoff step and at most 25%, never above the cap
            let fraction = ((multiplier - 1.0) / 2.0).clamp(0.0, 0.25);
            let jitter = rand_jitter(delay * fraction);
            (delay + jitter).min(self.max_delay_ms as f64) as u64
        } else {
            delay as u64
        }
    }

    /// Delay of the last allowed attempt before the `max_delay_ms` cap.
    pub fn final_uncapped_delay(&self) -> f64 {
        self.initial_delay_ms as f64
            * (self.backoff_multiplier as f64).powi(self.max_attempts.saturating_sub(1) as i32)
    }

    /// Check if more reconnection attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && attempt < self.max_attempts
    }
}

/// Pseudo-random jitter in `[0, range)` from a simple LCG over the clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    normalized * range
}

/// Transport channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Backend speech service WebSocket URL (e.g. `wss://speech.example.com/stream`)
    pub url: String,
    /// Bound on opening the stream
    pub connect_timeout: Duration,
    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,
    /// Reconnection policy for abnormal closes
    pub reconnection: ReconnectionConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/stream".to_string(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

/// Parameters of one call's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub call_id: String,
    /// Bearer token presented to the backend
    pub token: String,
    pub language: String,
    pub model: String,
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Opening the stream
    Connecting,
    /// Connected and ready
    Connected,
    /// Reconnecting after an abnormal close
    Reconnecting,
    /// Reconnection attempts exhausted
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a transport channel to its subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The stream is open
    Connected,
    /// A parsed inbound message
    Message(ServerMessage),
    /// The stream closed
    Disconnected { code: u16, reason: String },
    /// A reconnection attempt is scheduled
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// A reconnection attempt succeeded and the stream was re-initialized
    Reconnected { attempt: u32 },
    /// Reconnection attempts are exhausted; the channel is now failed
    ReconnectExhausted { attempts: u32 },
    /// A non-fatal channel error
    Error(String),
}

// =============================================================================
// Traits
// =============================================================================

/// A bidirectional message channel to the backend speech service for one call.
///
/// All methods take `&self` so a channel can be shared between the call
/// manager and the speech coordinator.
#[async_trait]
pub trait BaseTransport: Send + Sync {
    /// Open the stream and send its initialization message.
    ///
    /// Fails with `ConnectionTimeout` if the stream does not open within the
    /// connect timeout.
    async fn connect(&self, params: StreamParams) -> TransportResult<()>;

    /// Send a message. Fails with `NotConnected` if the stream is not open.
    async fn send(&self, message: ClientMessage) -> TransportResult<()>;

    /// Close the stream. Suppresses reconnection; safe to repeat.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Whether the stream is open.
    fn is_ready(&self) -> bool;

    fn connection_state(&self) -> ConnectionState;

    /// Register a subscriber for channel events.
    fn subscribe(&self, handler: Arc<dyn Fn(&TransportEvent) + Send + Sync>) -> Subscription;
}

/// Creates one independent transport channel per call.
pub trait TransportFactory: Send + Sync {
    fn create(&self, call_id: &str) -> Arc<dyn BaseTransport>;
}
