mod base;
mod generator;
pub mod openai;
pub mod persona;

pub use base::{ChatMessage, ChatModel, ChatRequest, ChatRole, LLMError, LLMResult};
pub use generator::{GenerationError, GeneratorSettings, ResponseGenerator};
pub use openai::OpenAIChat;
