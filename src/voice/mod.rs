//! Conversational voice engine: live websocket sessions and transcript
//! retrieval.

pub mod protocol;
pub mod session;
pub mod transcript;

pub use protocol::{EngineCommand, EngineEvent};
pub use session::{ConvaiEngine, EngineSession, VoiceEngine};
pub use transcript::{ConvaiTranscripts, TranscriptSource};

use crate::retry::Retryable;

/// Errors from the voice engine.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("session closed")]
    Closed,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("voice API returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl Retryable for VoiceError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Connect(_) => true,
            Self::Status { status, .. } => *status == 404 || *status == 429 || *status >= 500,
            Self::Protocol(_) | Self::Closed => false,
        }
    }
}
