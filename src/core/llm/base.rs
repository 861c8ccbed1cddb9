use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LLMResult<T> = Result<T, LLMError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LLMError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat completion request. Conversation history is kept
/// in this shape so it can be replayed to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A text-generation backend.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion. `Ok(None)` means the model answered without content.
    async fn complete(&self, request: ChatRequest) -> LLMResult<Option<String>>;
}
