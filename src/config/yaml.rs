use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override the corresponding environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   public_url: "https://voice.example.com"
///   tls:
///     cert_path: "/etc/gusto/cert.pem"
///     key_path: "/etc/gusto/key.pem"
///
/// providers:
///   deepgram_api_key: "your-deepgram-key"
///   deepgram_url: "wss://api.deepgram.com/v1/listen"
///   openai_api_key: "your-openai-key"
///   openai_base_url: "https://api.openai.com/v1"
///
/// stt:
///   model: "nova-2"
///   language: "en-US"
///
/// llm:
///   model: "gpt-4o"
///   max_tokens: 150
///   temperature: 0.7
///
/// tts:
///   model: "tts-1"
///   voice: "alloy"
///   speed: 1.0
///   audio_dir: "/var/lib/gusto/audio"
///
/// delivery:
///   mode: "stream"
///   announce_voice: "Polly.Joanna"
///
/// twilio:
///   account_sid: "AC..."
///   auth_token: "your-auth-token"
///
/// leads:
///   webhook_url: "https://crm.example.com/leads"
///
/// security:
///   cors_allowed_origins: "https://example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 200
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub stt: Option<SttYaml>,
    pub llm: Option<LlmYaml>,
    pub tts: Option<TtsYaml>,
    pub delivery: Option<DeliveryYaml>,
    pub twilio: Option<TwilioYaml>,
    pub leads: Option<LeadsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL used in TwiML stream URLs
    pub public_url: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Upstream provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub deepgram_api_key: Option<String>,
    /// Override of the Deepgram live streaming endpoint
    pub deepgram_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SttYaml {
    pub model: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    /// Directory for reply audio files; an empty string disables saving
    pub audio_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeliveryYaml {
    /// "announce" or "stream"
    pub mode: Option<String>,
    pub announce_voice: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LeadsYaml {
    pub webhook_url: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
