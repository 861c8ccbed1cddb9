//! Twilio voice webhook
//!
//! Answers an incoming call with a greeting and connects the call audio to
//! the media stream endpoint.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::llm::persona;
use crate::core::twiml;
use crate::state::AppState;

/// Fields of Twilio's call webhook that are used here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VoiceWebhook {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub call_status: Option<String>,
}

/// `POST /twilio/voice`
pub async fn voice_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(call): Form<VoiceWebhook>,
) -> impl IntoResponse {
    info!(
        call_sid = call.call_sid.as_deref().unwrap_or("unknown"),
        status = call.call_status.as_deref().unwrap_or("unknown"),
        "Incoming call"
    );

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let stream_url = state.config.stream_url(host);

    let mut parameters = Vec::new();
    if let Some(from) = call.from.as_deref().filter(|f| !f.is_empty()) {
        parameters.push(("from", from));
    }
    if let Some(sid) = call.call_sid.as_deref().filter(|s| !s.is_empty()) {
        parameters.push(("callSid", sid));
    }

    let greeting = persona::greeting();
    let body = twiml::connect_stream(
        Some((greeting.as_str(), state.config.announce_voice.as_str())),
        &stream_url,
        &parameters,
    );

    ([(header::CONTENT_TYPE, "text/xml")], body)
}
