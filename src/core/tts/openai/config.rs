//! Model and voice names accepted by OpenAI speech.

use crate::core::tts::base::TTSError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAITTSModel {
    /// Lower latency, the default for phone replies
    #[default]
    Tts1,
    Tts1Hd,
    Gpt4oMiniTts,
}

impl OpenAITTSModel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tts1 => "tts-1",
            Self::Tts1Hd => "tts-1-hd",
            Self::Gpt4oMiniTts => "gpt-4o-mini-tts",
        }
    }
}

impl std::str::FromStr for OpenAITTSModel {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tts-1" => Ok(Self::Tts1),
            "tts-1-hd" => Ok(Self::Tts1Hd),
            "gpt-4o-mini-tts" => Ok(Self::Gpt4oMiniTts),
            other => Err(TTSError::InvalidConfiguration(format!(
                "Unknown OpenAI TTS model: {other}"
            ))),
        }
    }
}

/// Voices available on every OpenAI speech model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAIVoice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl OpenAIVoice {
    pub const ALL: [OpenAIVoice; 6] = [
        Self::Alloy,
        Self::Echo,
        Self::Fable,
        Self::Onyx,
        Self::Nova,
        Self::Shimmer,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl std::str::FromStr for OpenAIVoice {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str() == wanted)
            .ok_or_else(|| {
                TTSError::InvalidConfiguration(format!(
                    "Unknown OpenAI voice: {s}. Expected one of: alloy, echo, fable, onyx, nova, shimmer"
                ))
            })
    }
}

impl std::fmt::Display for OpenAIVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
