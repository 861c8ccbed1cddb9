use bytes::Bytes;
use thiserror::Error;

pub type TTSResult<T> = Result<T, TTSError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TTSError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Audio container requested from the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// MP3, what the announce path stores on disk
    #[default]
    Mp3,
    Wav,
    /// Raw 16-bit little-endian mono PCM at 24 kHz
    Pcm,
}

impl AudioFormat {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    #[inline]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }

    /// Sample rate of synthesized audio. OpenAI speech is always 24 kHz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        24000
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" | "mpeg" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "pcm" | "linear16" => Ok(Self::Pcm),
            other => Err(TTSError::InvalidConfiguration(format!(
                "Unsupported audio format: {other}"
            ))),
        }
    }
}

/// One synthesized reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub data: Bytes,
    pub format: AudioFormat,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(data: Bytes, format: AudioFormat) -> Self {
        Self {
            data,
            format,
            sample_rate: format.sample_rate(),
        }
    }
}

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Voice options applied to every reply of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub model: String,
    pub voice: String,
    /// Playback speed multiplier
    pub speed: f32,
    pub format: AudioFormat,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            format: AudioFormat::Mp3,
        }
    }
}

impl VoiceSettings {
    /// Speed clamped into the range every provider accepts.
    pub fn clamped_speed(&self) -> f32 {
        if self.speed.is_finite() {
            self.speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }
}

/// Turns a reply utterance into audio.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> TTSResult<AudioData>;

    fn provider_name(&self) -> &'static str;
}
