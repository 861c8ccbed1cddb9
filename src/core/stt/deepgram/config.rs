//! Deepgram live transcription configuration.

use std::time::Duration;
use url::Url;

use crate::core::stt::base::{STTConfig, STTError};

/// Default Deepgram live streaming endpoint.
pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Deepgram closes idle streams after roughly 10 s without audio.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Deepgram-specific settings layered over the shared [`STTConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeepgramSTTConfig {
    pub base: STTConfig,
    /// Send `KeepAlive` when no audio was sent for this long
    pub keepalive_interval: Duration,
    /// Ask Deepgram to emit `UtteranceEnd` events after this much silence
    pub utterance_end_ms: Option<u32>,
}

impl Default for DeepgramSTTConfig {
    fn default() -> Self {
        Self {
            base: STTConfig::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            utterance_end_ms: None,
        }
    }
}

impl DeepgramSTTConfig {
    pub fn from_base(base: STTConfig) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Build the `listen` URL with every stream option as a query parameter.
    pub fn build_websocket_url(&self) -> Result<Url, STTError> {
        let endpoint = self
            .base
            .endpoint
            .as_deref()
            .unwrap_or(DEEPGRAM_LISTEN_URL);

        let mut url = Url::parse(endpoint).map_err(|e| {
            STTError::ConfigurationError(format!("Invalid Deepgram endpoint {endpoint}: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("model", &self.base.model)
                .append_pair("language", &self.base.language)
                .append_pair("encoding", &self.base.encoding)
                .append_pair("sample_rate", &self.base.sample_rate.to_string())
                .append_pair("channels", &self.base.channels.to_string())
                .append_pair("punctuate", bool_str(self.base.punctuation))
                .append_pair("smart_format", bool_str(self.base.smart_format))
                .append_pair("interim_results", bool_str(self.base.interim_results));

            if let Some(ms) = self.base.endpointing_ms {
                query.append_pair("endpointing", &ms.to_string());
            }
            // UtteranceEnd requires interim results
            if let (Some(ms), true) = (self.utterance_end_ms, self.base.interim_results) {
                query.append_pair("utterance_end_ms", &ms.to_string());
            }
        }

        Ok(url)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
