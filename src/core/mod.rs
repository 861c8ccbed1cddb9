pub mod call;
pub mod codec;
pub mod llm;
pub mod stt;
pub mod tts;
pub mod twiml;

// Re-export commonly used types for convenience
pub use call::{
    CallMetadata, ConversationHandle, DeliveryMode, LeadRecord, ReplyDelivery, SessionError,
    SessionManager, TransportEvent, TransportRoute,
};
pub use codec::CodecError;
pub use llm::{ChatMessage, ChatModel, LLMError, OpenAIChat, ResponseGenerator};
pub use stt::{BaseSTT, DeepgramSTT, STTConfig, STTConnector, STTError, STTResult};
pub use tts::{AudioData, AudioFormat, OpenAITTS, SpeechSynthesizer, TTSError, VoiceSettings};
