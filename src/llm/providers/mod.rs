//! LLM provider implementations.
//!
//! Each submodule implements [`TextProvider`](super::provider::TextProvider)
//! for one backend.
//!
//! # Available providers
//!
//! - [`anthropic`]: Anthropic Messages API
//! - [`openai`]: OpenAI Chat Completions (with JSON-object mode)
//! - [`fallback`]: primary/secondary wrapper

pub mod anthropic;
pub mod fallback;
pub mod openai;

pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use fallback::FallbackProvider;
pub use openai::{OpenAiAdapter, OpenAiConfig};
