//! Turns one finalized transcript into one reply.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::base::{ChatMessage, ChatModel, ChatRequest, LLMError};
use super::persona;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Model(#[from] LLMError),

    #[error("Generation failed: model returned no content")]
    EmptyCompletion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            system_prompt: persona::system_prompt(),
        }
    }
}

/// Stateless: the caller owns the history and decides what to append.
#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn ChatModel>,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn ChatModel>, settings: GeneratorSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Messages sent for a turn: persona, prior turns, then the new transcript.
    pub fn build_request(&self, transcript: &str, history: &[ChatMessage]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.settings.system_prompt.clone()));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(transcript));

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    pub async fn generate(
        &self,
        transcript: &str,
        history: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let request = self.build_request(transcript, history);
        let content = self.model.complete(request).await?;

        match content.map(|text| text.trim().to_string()) {
            Some(reply) if !reply.is_empty() => {
                debug!("Generated reply of {} chars", reply.len());
                Ok(reply)
            }
            _ => Err(GenerationError::EmptyCompletion),
        }
    }
}
