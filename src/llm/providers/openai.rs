//! OpenAI Chat Completions adapter.
//!
//! Non-streaming `POST /v1/chat/completions`. When the request asks for
//! JSON, `response_format: {"type": "json_object"}` is set so the model
//! returns a schema-valid object.

use async_trait::async_trait;
use std::time::Duration;

use crate::llm::error::ProviderError;
use crate::llm::provider::{GenerationRequest, TextProvider};

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (bearer token).
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create a new config.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build a Chat Completions request body.
pub fn build_request_body(model: &str, request: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(serde_json::json!({"role": "system", "content": request.system}));
    }
    messages.push(serde_json::json!({"role": "user", "content": request.user}));
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
    });
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    if request.json_mode {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    body
}

/// Pull `choices[0].message.content` out of a completion.
pub fn extract_content(response: &serde_json::Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Extract an error message from an OpenAI error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// OpenAI provider adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    /// Create a new adapter.
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[async_trait]
impl TextProvider for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("openai api key is empty".into()));
        }

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = build_request_body(&self.config.model, request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                "OpenAI",
                status,
                &extract_error_message(&body),
            ));
        }

        let json: serde_json::Value = response.json().await?;
        match extract_content(&json) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_owned()),
            _ => Err(ProviderError::Empty("OpenAI returned no content".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn json_mode_sets_response_format() {
        let body = build_request_body("gpt-4o-mini", &GenerationRequest::new("s", "u").json());
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
    }

    #[test]
    fn plain_mode_has_no_response_format() {
        let body = build_request_body("m", &GenerationRequest::new("s", "u"));
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn empty_system_prompt_sends_only_the_user_turn() {
        let body = build_request_body("gpt-4o-mini-search-preview", &GenerationRequest::new("", "news?"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn extract_content_reads_first_choice() {
        let resp = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "YES"}}]
        });
        assert_eq!(extract_content(&resp), Some("YES"));
        assert_eq!(extract_content(&serde_json::json!({"choices": []})), None);
    }
}
