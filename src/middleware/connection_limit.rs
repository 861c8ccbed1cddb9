//! Connection limit middleware for WebSocket connections
//!
//! Enforces the global `MAX_WEBSOCKET_CONNECTIONS` cap on media stream
//! upgrades.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use gusto_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/ws", get(twilio_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::{AppState, ConnectionGuard, ConnectionLimitError};

/// Request extension carrying the reserved slot to the WebSocket handler.
#[derive(Clone, Debug)]
pub struct ConnectionSlot(pub Arc<ConnectionGuard>);

/// Middleware that enforces the WebSocket connection limit.
///
/// Only WebSocket upgrade requests (detected by the Upgrade header) are
/// counted. Over the limit the request is answered with 503.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    match state.try_acquire_connection() {
        Ok(guard) => {
            // Released when the handler drops the slot
            request
                .extensions_mut()
                .insert(ConnectionSlot(Arc::new(guard)));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                active = state.ws_connection_count(),
                "Rejecting connection: global limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::SessionManager;
    use crate::core::llm::{
        ChatModel, ChatRequest, GeneratorSettings, LLMResult, ResponseGenerator,
    };
    use crate::core::stt::{BaseSTT, STTConfig, STTConnector, STTError};
    use crate::core::tts::{AudioData, SpeechSynthesizer, TTSError, TTSResult, VoiceSettings};
    use crate::config::ServerConfig;

    struct NoConnector;

    impl STTConnector for NoConnector {
        fn create(&self, _config: &STTConfig) -> Result<Box<dyn BaseSTT>, STTError> {
            Err(STTError::ConfigurationError("unused".to_string()))
        }
    }

    struct NoModel;

    #[async_trait::async_trait]
    impl ChatModel for NoModel {
        async fn complete(&self, _request: ChatRequest) -> LLMResult<Option<String>> {
            Ok(None)
        }
    }

    struct NoVoice;

    #[async_trait::async_trait]
    impl SpeechSynthesizer for NoVoice {
        async fn synthesize(&self, _text: &str, _settings: &VoiceSettings) -> TTSResult<AudioData> {
            Err(TTSError::InternalError("unused".to_string()))
        }

        fn provider_name(&self) -> &'static str {
            "none"
        }
    }

    fn state_with_limit(max: Option<usize>) -> Arc<AppState> {
        let config = ServerConfig {
            host: "localhost".to_string(),
            port: 3001,
            tls: None,
            public_url: None,
            deepgram_api_key: None,
            deepgram_url: None,
            openai_api_key: None,
            openai_base_url: "http://localhost".to_string(),
            stt_model: "nova-2".to_string(),
            stt_language: "en-US".to_string(),
            llm_model: "gpt-4o".to_string(),
            llm_max_tokens: 150,
            llm_temperature: 0.7,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            audio_dir: None,
            delivery_mode: Default::default(),
            announce_voice: "Polly.Joanna".to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            lead_webhook_url: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: max,
        };
        let sessions = SessionManager::builder(
            Arc::new(NoConnector),
            STTConfig::default(),
            ResponseGenerator::new(Arc::new(NoModel), GeneratorSettings::default()),
            Arc::new(NoVoice),
        )
        .build();
        AppState::new(config, sessions)
    }

    #[test]
    fn test_connection_limit_error_debug() {
        assert_eq!(
            format!("{:?}", ConnectionLimitError::GlobalLimitReached),
            "GlobalLimitReached"
        );
    }

    #[tokio::test]
    async fn test_global_connection_limit() {
        let state = state_with_limit(Some(2));
        assert_eq!(state.ws_connection_count(), 0);

        let first = state.try_acquire_connection().unwrap();
        let _second = state.try_acquire_connection().unwrap();
        assert_eq!(state.ws_connection_count(), 2);

        assert_eq!(
            state.try_acquire_connection().unwrap_err(),
            ConnectionLimitError::GlobalLimitReached
        );

        // Dropping a guard frees its slot
        drop(first);
        assert_eq!(state.ws_connection_count(), 1);
        assert!(state.try_acquire_connection().is_ok());
    }

    #[tokio::test]
    async fn test_unlimited_by_default() {
        let state = state_with_limit(None);
        let guards: Vec<_> = (0..100)
            .map(|_| state.try_acquire_connection().unwrap())
            .collect();
        assert_eq!(state.ws_connection_count(), 100);
        drop(guards);
        assert_eq!(state.ws_connection_count(), 0);
    }
}
