//! OpenAI chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::base::{ChatModel, ChatRequest, LLMError, LLMResult};

pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIChat {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> LLMResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LLMError::InvalidConfiguration(format!("Failed to build HTTP client: {e}")))?;

        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LLMError::InvalidConfiguration(
                "API key is required for OpenAI chat".to_string(),
            ));
        }

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or(OPENAI_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, request: ChatRequest) -> LLMResult<Option<String>> {
        debug!(
            "Requesting {} completion with {} messages",
            request.model,
            request.messages.len()
        );

        let response = self
            .build_request(&request)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("OpenAI chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("Malformed completion: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}
