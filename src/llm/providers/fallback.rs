//! Fallback provider adapter.
//!
//! Wraps a primary provider with a secondary one. Any primary failure is
//! logged and the identical request is sent to the secondary. If both fail
//! the secondary's error is returned.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::llm::error::ProviderError;
use crate::llm::provider::{GenerationRequest, TextProvider};

/// A provider that falls back to a secondary provider on any error.
pub struct FallbackProvider {
    primary: Arc<dyn TextProvider>,
    fallback: Arc<dyn TextProvider>,
    /// Count of fallback activations (for observability).
    fallback_count: AtomicU32,
}

impl FallbackProvider {
    /// Create a new fallback-enabled provider.
    pub fn new(primary: Arc<dyn TextProvider>, fallback: Arc<dyn TextProvider>) -> Self {
        Self {
            primary,
            fallback,
            fallback_count: AtomicU32::new(0),
        }
    }

    /// Number of times the fallback provider has been activated.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FallbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

#[async_trait]
impl TextProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        match self.primary.generate(request).await {
            Ok(text) => Ok(text),
            Err(e) => {
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "primary provider failed, falling back"
                );
                self.fallback.generate(request).await.inspect_err(|e2| {
                    tracing::error!(
                        fallback = self.fallback.name(),
                        error = %e2,
                        "fallback provider failed too"
                    );
                })
            }
        }
    }
}
