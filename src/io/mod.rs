//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sse` - Server-sent event decoder
//! - `source` - Connections to the state source (HTTP)
//! - `state_stream` - Long-lived reader producing door state change events

pub mod source;
pub mod sse;
pub mod state_stream;

// Re-export commonly used types
pub use source::{Connector, EventBody, HttpConnector};
pub use sse::{DecodeError, SseDecoder, SseEvent};
pub use state_stream::{StateStream, StreamError, StreamOptions};
