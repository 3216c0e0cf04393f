//! Prompt completion providers used for narratives.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors from a prompt provider.
#[derive(Error, Debug)]
pub enum PromptError {
    /// The provider reported that its usage quota is exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Provider not configured.
    #[error("prompt provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider did not answer in time.
    #[error("completion timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PromptError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, PromptError::QuotaExceeded(_))
    }
}

/// Something that can complete a prompt.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, PromptError>;
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAIChatProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
}

impl OpenAIChatProvider {
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for OpenAIChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, PromptError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(PromptError::ProviderNotConfigured)?;

        debug!("Requesting completion with model: {}", self.model);

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // OpenAI signals both rate limits and exhausted credit with 429;
            // only the latter is a hard quota.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && error_text.contains("quota") {
                return Err(PromptError::QuotaExceeded(error_text));
            }
            return Err(PromptError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let result: ChatCompletionResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PromptError::InvalidResponse("No completion in response".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAIChatProvider {
        OpenAIChatProvider::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hello" } }]
            })))
            .mount(&server)
            .await;

        let text = provider_for(&server).complete("Hi").await.unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_insufficient_quota_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "type": "insufficient_quota",
                    "message": "You exceeded your current quota"
                }
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete("Hi").await.unwrap_err();
        assert!(err.is_quota_exceeded());
    }

    #[tokio::test]
    async fn test_plain_rate_limit_is_not_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete("Hi").await.unwrap_err();
        assert!(matches!(err, PromptError::ApiRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete("Hi").await.unwrap_err();
        assert!(matches!(err, PromptError::InvalidResponse(_)));
    }
}
