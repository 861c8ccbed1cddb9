//! Application state shared by every handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::call::{
    DeliveryMode, LoggingAnnouncer, LoggingLeadSink, ReplyDelivery, SessionManager,
    TwilioCallUpdater, WebhookLeadSink,
};
use crate::core::llm::{OpenAIChat, ResponseGenerator};
use crate::core::stt::create_stt_connector;
use crate::core::tts::{AudioArtifactStore, OpenAITTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionManager,
    ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, sessions: SessionManager) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions,
            ws_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Build the state with the real upstream providers named in `config`.
    pub fn from_config(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let sessions = build_session_manager(&config)?;
        Ok(Self::new(config, sessions))
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    /// Reserve a WebSocket slot. The slot is released when the returned
    /// guard is dropped.
    pub fn try_acquire_connection(&self) -> Result<ConnectionGuard, ConnectionLimitError> {
        let max = self.config.max_websocket_connections;
        self.ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;

        Ok(ConnectionGuard {
            counter: self.ws_connections.clone(),
        })
    }
}

/// Holds one WebSocket connection slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

fn build_session_manager(
    config: &ServerConfig,
) -> Result<SessionManager, Box<dyn std::error::Error>> {
    let openai_key = config.openai_api_key.clone().unwrap_or_default();
    let stt_config = config.stt_config();

    let connector = create_stt_connector(&stt_config)?;
    let chat = OpenAIChat::new(openai_key.clone(), Some(&config.openai_base_url))?;
    let tts = OpenAITTS::new(openai_key, Some(&config.openai_base_url))?;
    let generator = ResponseGenerator::new(Arc::new(chat), config.generator_settings());

    let delivery = match config.delivery_mode {
        DeliveryMode::StreamAudio => ReplyDelivery::stream(),
        DeliveryMode::AnnounceText => {
            warn!("Announce delivery replaces the call TwiML, calls end after the first reply");
            match (&config.twilio_account_sid, &config.twilio_auth_token) {
                (Some(sid), Some(token)) => {
                    info!("Replies will be announced through the Twilio REST API");
                    let updater = TwilioCallUpdater::new(sid.clone(), token.clone(), None)?;
                    ReplyDelivery::announce(Arc::new(updater), config.announce_voice.clone())
                }
                _ => {
                    info!("Twilio credentials not configured, announced replies are only logged");
                    ReplyDelivery::announce(
                        Arc::new(LoggingAnnouncer),
                        config.announce_voice.clone(),
                    )
                }
            }
        }
    };

    let mut builder = SessionManager::builder(
        Arc::from(connector),
        stt_config,
        generator,
        Arc::new(tts),
    )
    .delivery(delivery)
    .voice(config.voice_settings());

    if let Some(dir) = &config.audio_dir {
        builder = builder.artifacts(AudioArtifactStore::new(dir.clone()));
    }

    builder = match &config.lead_webhook_url {
        Some(url) => builder.lead_sink(Arc::new(WebhookLeadSink::new(url.clone())?)),
        None => builder.lead_sink(Arc::new(LoggingLeadSink)),
    };

    Ok(builder.build())
}
