mod artifacts;
mod base;
pub mod openai;

pub use artifacts::{ArtifactError, AudioArtifactStore};
pub use base::{
    AudioData, AudioFormat, MAX_SPEED, MIN_SPEED, SpeechSynthesizer, TTSError, TTSResult,
    VoiceSettings,
};
pub use openai::{OPENAI_API_BASE_URL, OpenAITTS, OpenAITTSModel, OpenAIVoice};
