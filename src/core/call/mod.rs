//! Call manager module.
//!
//! Owns call records and drives each call through its lifecycle:
//! routing, answering, speech, and ending. Lifecycle events are published to
//! subscribers (the UI event stream) and call records are mirrored to the
//! persistence backend.

mod carrier;
mod events;
mod manager;
mod types;

pub use carrier::{
    CarrierControl, CarrierError, CarrierLeg, CarrierResult, HttpCarrierControl,
    LoggingCarrierControl,
};
pub use events::CallEvent;
pub use manager::{CallConfig, CallManager, CallServices};
pub use types::{
    Call, CallDirection, CallError, CallResult, CallStatus, IncomingCall, Message, MessageKind,
    MessageMetadata, MessageSender, SenderKind, StatusUpdate,
};
