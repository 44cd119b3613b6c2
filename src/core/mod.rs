pub mod audio;
pub mod call;
pub mod diagnostics;
pub mod events;
pub mod persistence;
pub mod routing;
pub mod speech;
pub mod transport;
pub mod voice_config;

// Re-export commonly used types for convenience
pub use audio::{AudioBridge, AudioConfig, AudioError};
pub use call::{
    Call, CallConfig, CallError, CallEvent, CallManager, CallServices, CallStatus, IncomingCall,
    Message, StatusUpdate,
};
pub use diagnostics::{DiagnosticsConfig, DiagnosticsRecorder, ErrorCategory, Severity};
pub use events::{EventBus, Subscription};
pub use persistence::{CallRecordStore, HttpCallRecordStore, NoopCallRecordStore};
pub use routing::{Router, RoutingDecision, RoutingRule};
pub use speech::{SpeechConfig, SpeechCoordinator, SpeechError, SpeechEvent};
pub use transport::{
    BaseTransport, TransportConfig, TransportError, TransportEvent, TransportFactory,
    WebSocketTransportFactory,
};
pub use voice_config::{VoiceConfig, VoiceConfigCache, VoiceSettings};
