use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// A transcription result emitted by a streaming STT provider.
#[derive(Debug, Clone, PartialEq)]
pub struct STTResult {
    /// Transcribed text
    pub transcript: String,
    /// Whether the provider will no longer revise this text
    pub is_final: bool,
    /// Whether the provider detected the end of the utterance
    pub is_speech_final: bool,
    /// Confidence in the range 0.0..=1.0
    pub confidence: f32,
}

impl STTResult {
    pub fn new(transcript: String, is_final: bool, is_speech_final: bool, confidence: f32) -> Self {
        Self {
            transcript,
            is_final,
            is_speech_final,
            confidence,
        }
    }
}

/// Errors raised by STT providers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),
}

/// Async callback invoked for every surfaced transcription result.
pub type STTResultCallback =
    Arc<dyn Fn(STTResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Async callback invoked for provider errors.
pub type STTErrorCallback =
    Arc<dyn Fn(STTError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Per-call transcription stream configuration.
///
/// Defaults describe a Twilio media stream: 8 kHz mono mu-law with
/// punctuation on and interim results off, so only finalized utterances
/// reach the caller of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct STTConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: String,
    pub punctuation: bool,
    pub smart_format: bool,
    pub interim_results: bool,
    /// Silence in milliseconds the provider waits before finalizing
    pub endpointing_ms: Option<u32>,
    /// Override of the provider's streaming endpoint
    pub endpoint: Option<String>,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            provider: "deepgram".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            sample_rate: 8000,
            channels: 1,
            encoding: "mulaw".to_string(),
            punctuation: true,
            smart_format: true,
            interim_results: false,
            endpointing_ms: None,
            endpoint: None,
        }
    }
}

/// A live streaming transcription connection.
///
/// One instance serves exactly one call. Results and errors are pushed to
/// the registered callbacks from the provider's own tasks; an error never
/// closes the stream by itself.
#[async_trait::async_trait]
pub trait BaseSTT: Send + Sync {
    fn new(config: STTConfig) -> Result<Self, STTError>
    where
        Self: Sized;

    /// Open the streaming connection.
    async fn connect(&mut self) -> Result<(), STTError>;

    /// Signal end of audio and close the connection. Safe to call more than once.
    async fn disconnect(&mut self) -> Result<(), STTError>;

    fn is_ready(&self) -> bool;

    /// Queue raw audio in the configured encoding.
    async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), STTError>;

    async fn on_result(&mut self, callback: STTResultCallback) -> Result<(), STTError>;

    async fn on_error(&mut self, callback: STTErrorCallback) -> Result<(), STTError>;

    fn get_config(&self) -> Option<&STTConfig>;

    fn get_provider_info(&self) -> &'static str;
}

/// Creates one transcription stream per call.
///
/// The session manager holds a connector rather than a stream so that every
/// call gets its own connection and tests can substitute fakes.
pub trait STTConnector: Send + Sync {
    fn create(&self, config: &STTConfig) -> Result<Box<dyn BaseSTT>, STTError>;
}
