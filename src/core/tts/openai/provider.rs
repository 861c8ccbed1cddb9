//! OpenAI speech synthesis.
//!
//! - Endpoint: `POST {base_url}/audio/speech`
//! - Output: mp3, wav or raw 24 kHz PCM
//! - Speed: 0.25 to 4.0

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::config::{OpenAITTSModel, OpenAIVoice};
use crate::core::tts::base::{AudioData, SpeechSynthesizer, TTSError, TTSResult, VoiceSettings};

pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI rejects longer inputs.
pub const MAX_INPUT_CHARS: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAITTS {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAITTS {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> TTSResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TTSError::InternalError(format!("Failed to build HTTP client: {e}")))?;
        Self::with_client(client, api_key, base_url)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: Option<&str>,
    ) -> TTSResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "API key is required for OpenAI TTS".to_string(),
            ));
        }

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or(OPENAI_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }

    fn build_request(&self, text: &str, settings: &VoiceSettings) -> TTSResult<reqwest::RequestBuilder> {
        let model: OpenAITTSModel = settings.model.parse()?;
        let voice: OpenAIVoice = settings.voice.parse()?;

        let mut body = json!({
            "model": model.as_str(),
            "input": text,
            "voice": voice.as_str(),
            "response_format": settings.format.as_str(),
        });

        let speed = settings.clamped_speed();
        if (speed - 1.0).abs() > 0.001 {
            body["speed"] = json!(speed);
        }

        Ok(self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAITTS {
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> TTSResult<AudioData> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TTSError::AudioGenerationFailed("Empty input text".to_string()));
        }
        if text.chars().count() > MAX_INPUT_CHARS {
            return Err(TTSError::AudioGenerationFailed(format!(
                "Input exceeds {MAX_INPUT_CHARS} characters"
            )));
        }

        let response = self
            .build_request(text, settings)?
            .send()
            .await
            .map_err(|e| TTSError::NetworkError(format!("OpenAI TTS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TTSError::ProviderError(format!(
                "OpenAI TTS returned {status}: {body}"
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| TTSError::NetworkError(format!("Failed to read OpenAI TTS audio: {e}")))?;
        if data.is_empty() {
            return Err(TTSError::AudioGenerationFailed(
                "OpenAI TTS returned no audio".to_string(),
            ));
        }

        debug!(
            "Synthesized {} bytes of {} with voice {}",
            data.len(),
            settings.format,
            settings.voice
        );
        Ok(AudioData::new(data, settings.format))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
