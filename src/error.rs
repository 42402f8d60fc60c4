//! Error types for the coachline service.

use crate::blob::BlobError;
use crate::llm::error::ProviderError;
use crate::notify::NotifyError;
use crate::store::StoreError;
use crate::telephony::TelephonyError;
use crate::voice::VoiceError;

/// Top-level error type for the coaching service.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    /// LLM provider call failed (after fallback).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Record store read/write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Telephony REST call failed.
    #[error("telephony error: {0}")]
    Telephony(#[from] TelephonyError),

    /// Voice engine session or transcript error.
    #[error("voice engine error: {0}")]
    Voice(#[from] VoiceError),

    /// Blob storage error.
    #[error("blob storage error: {0}")]
    Blob(#[from] BlobError),

    /// SMS / email dispatch error.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Scheduling extraction produced no usable result.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// Post-call pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoachError>;
