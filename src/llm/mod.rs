//! LLM capability used by every extraction and generation step.
//!
//! Two orderings are wired up from the same pair of adapters:
//!
//! - **prose**: Anthropic first, OpenAI as fallback (summaries, entities,
//!   ending classification, coaching replies)
//! - **structured**: OpenAI JSON-object mode first, Anthropic as fallback
//!   (scheduling and intent JSON)
//!
//! A third, single provider answers the voice agent's web searches.

pub mod error;
pub mod json;
pub mod provider;
pub mod providers;

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
pub use error::ProviderError;
pub use provider::{GenerationRequest, TextProvider};
use providers::{AnthropicAdapter, AnthropicConfig, FallbackProvider, OpenAiAdapter, OpenAiConfig};

/// The two provider orderings shared across the service.
#[derive(Clone)]
pub struct Providers {
    prose: Arc<dyn TextProvider>,
    structured: Arc<dyn TextProvider>,
    search: Arc<dyn TextProvider>,
}

impl Providers {
    /// Build both orderings from configuration.
    pub fn from_config(config: &LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let anthropic: Arc<dyn TextProvider> = Arc::new(AnthropicAdapter::new(
            AnthropicConfig::new(&config.anthropic_api_key, &config.anthropic_model)
                .with_base_url(&config.anthropic_base_url)
                .with_timeout(timeout),
        ));
        let openai: Arc<dyn TextProvider> = Arc::new(OpenAiAdapter::new(
            OpenAiConfig::new(&config.openai_api_key, &config.openai_model)
                .with_base_url(&config.openai_base_url)
                .with_timeout(timeout),
        ));
        let search = Arc::new(OpenAiAdapter::new(
            OpenAiConfig::new(&config.openai_api_key, &config.openai_search_model)
                .with_base_url(&config.openai_base_url)
                .with_timeout(timeout),
        ));
        Self::from_pair(anthropic, openai).with_search(search)
    }

    /// Wire the orderings from an explicit Anthropic-like / OpenAI-like pair.
    /// Searches go to the OpenAI-like side until [`Self::with_search`].
    pub fn from_pair(anthropic: Arc<dyn TextProvider>, openai: Arc<dyn TextProvider>) -> Self {
        Self {
            prose: Arc::new(FallbackProvider::new(Arc::clone(&anthropic), Arc::clone(&openai))),
            search: Arc::clone(&openai),
            structured: Arc::new(FallbackProvider::new(openai, anthropic)),
        }
    }

    /// Use `search` for web searches.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn TextProvider>) -> Self {
        self.search = search;
        self
    }

    /// Free-text ordering.
    pub fn prose(&self) -> &dyn TextProvider {
        self.prose.as_ref()
    }

    /// Structured-output ordering.
    pub fn structured(&self) -> &dyn TextProvider {
        self.structured.as_ref()
    }

    /// Web-search model, without fallback.
    pub fn search(&self) -> &dyn TextProvider {
        self.search.as_ref()
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("prose", &self.prose.name())
            .field("structured", &self.structured.name())
            .field("search", &self.search.name())
            .finish()
    }
}

/// Run `request` and collapse failure to `None`, logging under `step`.
pub async fn generate_or_none(
    provider: &dyn TextProvider,
    request: &GenerationRequest,
    step: &str,
) -> Option<String> {
    match provider.generate(request).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(step, code = e.code(), error = %e, "generation failed on every provider");
            None
        }
    }
}
