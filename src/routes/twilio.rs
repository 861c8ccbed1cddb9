//! Twilio route configuration

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::twilio::{twilio_stream_handler, voice_webhook};
use crate::state::AppState;
use std::sync::Arc;

/// Voice webhook route
///
/// `POST /twilio/voice` answers an incoming call with TwiML that connects
/// the call audio to `/ws`.
pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/twilio/voice", post(voice_webhook))
        .layer(TraceLayer::new_for_http())
}

/// Media stream WebSocket route
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for a Twilio Media Streams session
///
/// # Protocol
///
/// Twilio sends JSON text frames: `connected`, `start`, `media` (base64
/// 8 kHz mu-law), `mark`, `dtmf` and `stop`. When replies are streamed as
/// audio the server sends `media` frames followed by a `mark`.
pub fn create_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(twilio_stream_handler))
        .layer(TraceLayer::new_for_http())
}
