//! Configuration module for the Gusto voice gateway
//!
//! Server configuration comes from environment variables (with `.env` loaded
//! in `main`) and an optional YAML file. Priority: YAML > ENV vars > .env
//! values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use gusto_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod validation;
mod yaml;

use env::{env_var, env_var_allow_empty, parse_env};
use yaml::YamlConfig;

use crate::core::call::DeliveryMode;
use crate::core::llm::{GeneratorSettings, persona};
use crate::core::stt::STTConfig;
use crate::core::tts::VoiceSettings;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, TLS, public URL)
/// - Upstream credentials (Deepgram, OpenAI, Twilio)
/// - Per-call model and voice settings
/// - Reply delivery and lead hand-off
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Externally reachable base URL, e.g. `https://voice.example.com`
    pub public_url: Option<String>,

    // Provider credentials
    pub deepgram_api_key: Option<String>,
    pub deepgram_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,

    // Transcription
    pub stt_model: String,
    pub stt_language: String,

    // Reply generation
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,

    // Speech synthesis
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    /// `None` disables saving reply audio
    pub audio_dir: Option<PathBuf>,

    // Reply delivery
    pub delivery_mode: DeliveryMode,
    pub announce_voice: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,

    // Lead hand-off
    pub lead_webhook_url: Option<String>,

    // Security settings
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
    pub max_websocket_connections: Option<usize>,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.deepgram_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::load(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of environment variables.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = YamlConfig::from_file(path)?;
        let config = Self::load(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    fn load(yaml: Option<YamlConfig>) -> Result<Self, String> {
        let yaml = yaml.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();
        let tls = server.tls.unwrap_or_default();
        let providers = yaml.providers.unwrap_or_default();
        let stt = yaml.stt.unwrap_or_default();
        let llm = yaml.llm.unwrap_or_default();
        let tts = yaml.tts.unwrap_or_default();
        let delivery = yaml.delivery.unwrap_or_default();
        let twilio = yaml.twilio.unwrap_or_default();
        let leads = yaml.leads.unwrap_or_default();
        let security = yaml.security.unwrap_or_default();

        let tls = match (
            tls.cert_path.or_else(|| env_var("TLS_CERT_PATH")),
            tls.key_path.or_else(|| env_var("TLS_KEY_PATH")),
        ) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            (cert, key) => {
                validation::validate_pair(
                    "TLS_CERT_PATH",
                    cert.is_some(),
                    "TLS_KEY_PATH",
                    key.is_some(),
                )?;
                None
            }
        };

        let delivery_mode = match delivery.mode.or_else(|| env_var("REPLY_DELIVERY")) {
            Some(mode) => mode.parse::<DeliveryMode>()?,
            None => DeliveryMode::default(),
        };

        let audio_dir = match tts.audio_dir.or_else(|| env_var_allow_empty("AUDIO_DIR")) {
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(std::env::temp_dir().join("gusto")),
        };

        Ok(Self {
            host: server
                .host
                .or_else(|| env_var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: match server.port {
                Some(port) => port,
                None => parse_env("PORT")?.unwrap_or(DEFAULT_PORT),
            },
            tls,
            public_url: server
                .public_url
                .or_else(|| env_var("PUBLIC_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),

            deepgram_api_key: providers
                .deepgram_api_key
                .or_else(|| env_var("DEEPGRAM_API_KEY")),
            deepgram_url: providers.deepgram_url.or_else(|| env_var("DEEPGRAM_URL")),
            openai_api_key: providers
                .openai_api_key
                .or_else(|| env_var("OPENAI_API_KEY")),
            openai_base_url: providers
                .openai_base_url
                .or_else(|| env_var("OPENAI_BASE_URL"))
                .unwrap_or_else(|| crate::core::tts::OPENAI_API_BASE_URL.to_string()),

            stt_model: stt
                .model
                .or_else(|| env_var("STT_MODEL"))
                .unwrap_or_else(|| "nova-2".to_string()),
            stt_language: stt
                .language
                .or_else(|| env_var("STT_LANGUAGE"))
                .unwrap_or_else(|| "en-US".to_string()),

            llm_model: llm
                .model
                .or_else(|| env_var("LLM_MODEL"))
                .unwrap_or_else(|| "gpt-4o".to_string()),
            llm_max_tokens: match llm.max_tokens {
                Some(tokens) => tokens,
                None => parse_env("LLM_MAX_TOKENS")?.unwrap_or(150),
            },
            llm_temperature: match llm.temperature {
                Some(temperature) => temperature,
                None => parse_env("LLM_TEMPERATURE")?.unwrap_or(0.7),
            },

            tts_model: tts
                .model
                .or_else(|| env_var("TTS_MODEL"))
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: tts
                .voice
                .or_else(|| env_var("TTS_VOICE"))
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: match tts.speed {
                Some(speed) => speed,
                None => parse_env("TTS_SPEED")?.unwrap_or(1.0),
            },
            audio_dir,

            delivery_mode,
            announce_voice: delivery
                .announce_voice
                .or_else(|| env_var("ANNOUNCE_VOICE"))
                .unwrap_or_else(|| "Polly.Joanna".to_string()),
            twilio_account_sid: twilio
                .account_sid
                .or_else(|| env_var("TWILIO_ACCOUNT_SID")),
            twilio_auth_token: twilio
                .auth_token
                .or_else(|| env_var("TWILIO_AUTH_TOKEN")),

            lead_webhook_url: leads.webhook_url.or_else(|| env_var("LEAD_WEBHOOK_URL")),

            cors_allowed_origins: security
                .cors_allowed_origins
                .or_else(|| env_var("CORS_ALLOWED_ORIGINS")),
            rate_limit_requests_per_second: match security.rate_limit_requests_per_second {
                Some(rps) => rps,
                None => {
                    parse_env("RATE_LIMIT_REQUESTS_PER_SECOND")?.unwrap_or(DEFAULT_RATE_LIMIT_RPS)
                }
            },
            rate_limit_burst_size: match security.rate_limit_burst_size {
                Some(burst) => burst,
                None => parse_env("RATE_LIMIT_BURST_SIZE")?.unwrap_or(DEFAULT_RATE_LIMIT_BURST),
            },
            max_websocket_connections: match security.max_websocket_connections {
                Some(max) => Some(max),
                None => parse_env("MAX_WEBSOCKET_CONNECTIONS")?,
            },
        })
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_twilio_credentials(&self) -> bool {
        self.twilio_account_sid.is_some() && self.twilio_auth_token.is_some()
    }

    /// Interval after which one request of the per-IP quota is replenished.
    pub fn rate_limit_period(&self) -> Duration {
        let rps = u64::from(self.rate_limit_requests_per_second.max(1));
        Duration::from_nanos((1_000_000_000 / rps).max(1))
    }

    /// Transcription settings for one call.
    pub fn stt_config(&self) -> STTConfig {
        STTConfig {
            api_key: self.deepgram_api_key.clone().unwrap_or_default(),
            model: self.stt_model.clone(),
            language: self.stt_language.clone(),
            endpoint: self.deepgram_url.clone(),
            ..STTConfig::default()
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            model: self.llm_model.clone(),
            max_tokens: self.llm_max_tokens,
            temperature: self.llm_temperature,
            system_prompt: persona::system_prompt(),
        }
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            model: self.tts_model.clone(),
            voice: self.tts_voice.clone(),
            speed: self.tts_speed,
            format: self.delivery_mode.audio_format(),
        }
    }

    /// WebSocket URL Twilio should stream call audio to.
    ///
    /// Uses `public_url` when configured, otherwise the request's host.
    pub fn stream_url(&self, request_host: Option<&str>) -> String {
        let base = match (&self.public_url, request_host) {
            (Some(url), _) => url.clone(),
            (None, Some(host)) => format!("https://{host}"),
            (None, None) => format!("http://{}", self.address()),
        };
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base
        };
        format!("{ws_base}/ws")
    }

    /// Effective configuration with secrets replaced by set/unset markers.
    pub fn summary(&self) -> String {
        fn mark(value: &Option<String>) -> &'static str {
            if value.is_some() { "set" } else { "unset" }
        }

        let lines = [
            format!("address: {}", self.address()),
            format!("tls: {}", self.is_tls_enabled()),
            format!("public_url: {}", self.public_url.as_deref().unwrap_or("-")),
            format!("deepgram_api_key: {}", mark(&self.deepgram_api_key)),
            format!("openai_api_key: {}", mark(&self.openai_api_key)),
            format!("openai_base_url: {}", self.openai_base_url),
            format!("stt: {} ({})", self.stt_model, self.stt_language),
            format!(
                "llm: {} max_tokens={} temperature={}",
                self.llm_model, self.llm_max_tokens, self.llm_temperature
            ),
            format!(
                "tts: {} voice={} speed={}",
                self.tts_model, self.tts_voice, self.tts_speed
            ),
            format!(
                "audio_dir: {}",
                self.audio_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "disabled".to_string())
            ),
            format!("delivery: {}", self.delivery_mode),
            format!("twilio_credentials: {}", self.has_twilio_credentials()),
            format!("lead_webhook: {}", mark(&self.lead_webhook_url)),
            format!(
                "max_websocket_connections: {}",
                self.max_websocket_connections
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unlimited".to_string())
            ),
        ];
        lines.join("\n")
    }
}
