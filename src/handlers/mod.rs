//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `twilio` - Voice webhook and Media Streams WebSocket

pub mod api;
pub mod twilio;

pub use twilio::{twilio_stream_handler, voice_webhook};
