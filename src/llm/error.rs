//! Error types for the LLM provider layer.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`ProviderError::code()`].

use crate::retry::Retryable;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Provider rejected the request for quota / rate reasons.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Transport-level request failure.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Request timed out.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// Provider returned a non-success status not covered above.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";

    /// Response body could not be decoded into the expected shape.
    pub const PARSE_FAILED: &str = "PARSE_FAILED";

    /// Provider answered with no usable text.
    pub const EMPTY_RESPONSE: &str = "EMPTY_RESPONSE";
}

/// Errors produced by text-generation providers.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Rate limited or out of quota.
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Transport failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Request timed out.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),

    /// Non-success HTTP status.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Upstream(String),

    /// Response could not be parsed.
    #[error("[{}] {}", error_codes::PARSE_FAILED, .0)]
    Parse(String),

    /// Response contained no text.
    #[error("[{}] {}", error_codes::EMPTY_RESPONSE, .0)]
    Empty(String),
}

impl ProviderError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
            Self::Upstream(_) => error_codes::PROVIDER_ERROR,
            Self::Parse(_) => error_codes::PARSE_FAILED,
            Self::Empty(_) => error_codes::EMPTY_RESPONSE,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::Auth(m)
            | Self::RateLimited(m)
            | Self::Request(m)
            | Self::Timeout(m)
            | Self::Upstream(m)
            | Self::Parse(m)
            | Self::Empty(m) => m,
        }
    }

    /// Map an HTTP status + body into the matching variant.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, message: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth(format!("{provider} authentication failed: {message}")),
            429 => Self::RateLimited(format!("{provider} rate limited: {message}")),
            code => Self::Upstream(format!("{provider} HTTP {code}: {message}")),
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Auth(_) | Self::Parse(_) => false,
            Self::RateLimited(_)
            | Self::Request(_)
            | Self::Timeout(_)
            | Self::Upstream(_)
            | Self::Empty(_) => true,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Convenience alias for provider results.
pub type Result<T> = std::result::Result<T, ProviderError>;
