//! OpenAI text-to-speech (`/v1/audio/speech`).

mod config;
mod provider;

pub use config::{OpenAITTSModel, OpenAIVoice};
pub use provider::{MAX_INPUT_CHARS, OPENAI_API_BASE_URL, OpenAITTS};
