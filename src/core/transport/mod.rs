//! Transport channel module.
//!
//! A resilient bidirectional message channel between one call and the
//! backend speech service.
//!
//! # Architecture
//!
//! - `BaseTransport` trait for channel abstraction (mockable in tests)
//! - `TransportFactory` so every call gets its own independent channel
//! - Typed `TransportEvent`s delivered to isolated subscribers
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_telephony::core::transport::{
//!     BaseTransport, StreamParams, TransportConfig, WebSocketTransport,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = WebSocketTransport::new(TransportConfig::default());
//!     let _sub = transport.subscribe(Arc::new(|event| println!("{event:?}")));
//!     transport
//!         .connect(StreamParams {
//!             call_id: "call-1".to_string(),
//!             token: "token".to_string(),
//!             language: "en".to_string(),
//!             model: "nova-2".to_string(),
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

mod base;
mod channel;
mod messages;

pub use base::{
    BaseTransport, ConnectionState, ReconnectionConfig, StreamParams, TransportConfig,
    TransportError, TransportEvent, TransportFactory, TransportResult,
};
pub use channel::{WebSocketTransport, WebSocketTransportFactory};
pub use messages::{ClientMessage, ServerMessage};
