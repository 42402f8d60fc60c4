//! Anthropic Messages API adapter.
//!
//! Non-streaming: one `POST /v1/messages`, text blocks of the response are
//! concatenated. JSON mode is not native here; callers that need structured
//! output parse the text with [`crate::llm::json::parse_json_object`].

use async_trait::async_trait;
use std::time::Duration;

use crate::llm::error::ProviderError;
use crate::llm::provider::{GenerationRequest, TextProvider};

// ── Configuration ──────────────────────────────────────────────

/// Configuration for the Anthropic adapter.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Base URL for the API (defaults to `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API version header value.
    pub api_version: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Create a new Anthropic config.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            api_version: "2023-06-01".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the base URL (useful for testing with mock servers).
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

// ── Request Building ───────────────────────────────────────────

/// Build an Anthropic Messages API request body.
pub fn build_messages_request(model: &str, request: &GenerationRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "system": request.system,
        "messages": [{
            "role": "user",
            "content": request.user,
        }],
    });

    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }

    body
}

/// Concatenate every `text` content block of a Messages API response.
pub fn extract_text(response: &serde_json::Value) -> String {
    response
        .get("content")
        .and_then(serde_json::Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(serde_json::Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(serde_json::Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Extract an error message from an Anthropic error response body.
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

// ── Adapter ────────────────────────────────────────────────────

/// Anthropic provider adapter.
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create a new adapter.
    pub fn new(config: AnthropicConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[async_trait]
impl TextProvider for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("anthropic api key is empty".into()));
        }

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = build_messages_request(&self.config.model, request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                "Anthropic",
                status,
                &extract_error_message(&body),
            ));
        }

        let json: serde_json::Value = response.json().await?;
        let text = extract_text(&json);
        if text.trim().is_empty() {
            return Err(ProviderError::Empty("Anthropic returned no text".into()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn request_body_has_system_and_user() {
        let req = GenerationRequest::new("be brief", "hello").with_temperature(0.0);
        let body = build_messages_request("claude-test", &req);
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn request_body_omits_unset_temperature() {
        let body = build_messages_request("m", &GenerationRequest::new("s", "u"));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn extract_text_joins_text_blocks_only() {
        let response = serde_json::json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "world"}
            ]
        });
        assert_eq!(extract_text(&response), "Hello world");
    }

    #[test]
    fn error_message_prefers_json_message() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(extract_error_message(body), "Overloaded");
        assert_eq!(extract_error_message("plain"), "plain");
    }

    #[tokio::test]
    async fn empty_key_is_config_error() {
        let adapter = AnthropicAdapter::new(AnthropicConfig::new("", "m"));
        let err = adapter
            .generate(&GenerationRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }
}
