//! Provider trait and request type.
//!
//! Every extraction and generation step in the service talks to an LLM
//! through [`TextProvider`]: one system prompt, one user prompt, bounded
//! output tokens and an optional temperature.

use async_trait::async_trait;

use crate::llm::error::ProviderError;

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Ask for a JSON object response where the provider supports it.
    pub json_mode: bool,
}

impl GenerationRequest {
    /// Create a request with the default token budget (1000).
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: None,
            max_tokens: 1000,
            json_mode: false,
        }
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Request JSON-object output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Text-generation capability.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider identifier used in logs (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    /// Generate text for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}
