//! Telephony transport: REST calls, TwiML replies and the media-stream
//! wire format.

pub mod media;
pub mod twilio;
pub mod twiml;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::retry::Retryable;

pub use media::{StreamCommand, StreamEvent};
pub use twilio::TwilioClient;

/// Errors from the telephony provider.
#[derive(Debug, thiserror::Error)]
pub enum TelephonyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telephony API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("telephony not configured: {0}")]
    Config(String),
}

impl Retryable for TelephonyError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Parse(_) => true,
            // 404 covers recordings that are not finalized yet.
            Self::Status { status, .. } => *status == 404 || *status == 429 || *status >= 500,
            Self::Config(_) => false,
        }
    }
}

/// Parameters for an outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCallRequest {
    pub to: String,
    pub from: String,
    /// Webhook fetched when the call connects.
    pub url: String,
    pub status_callback: String,
    /// Asynchronous answering-machine-detection callback.
    pub amd_callback: String,
}

impl OutboundCallRequest {
    /// Standard outbound call back into our own incoming-call webhook.
    pub fn to_recipient(public_url: &str, from: &str, to: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        let phone = urlencoding::encode(to);
        Self {
            to: to.to_owned(),
            from: from.to_owned(),
            url: format!("{base}/incoming-call?isOutbound=true&recipientPhone={phone}"),
            status_callback: format!("{base}/call-status-callback"),
            amd_callback: format!("{base}/amd-status-callback?phone={phone}"),
        }
    }
}

/// A recording attached to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingInfo {
    pub sid: String,
    pub call_sid: String,
}

/// Telephony REST operations the service relies on.
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Place a call; returns the call sid.
    async fn place_outbound_call(
        &self,
        request: &OutboundCallRequest,
    ) -> Result<String, TelephonyError>;
    /// Hang up a live call.
    async fn complete_call(&self, call_sid: &str) -> Result<(), TelephonyError>;
    /// Start a dual-channel recording on a live call.
    async fn start_recording(&self, call_sid: &str, callback_url: &str)
    -> Result<(), TelephonyError>;
    /// Send an SMS; returns the message sid.
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, TelephonyError>;
    async fn list_recordings(&self, call_sid: &str) -> Result<Vec<RecordingInfo>, TelephonyError>;
    /// Download a recording as WAV.
    async fn download_recording(&self, recording_sid: &str) -> Result<Bytes, TelephonyError>;
    async fn delete_recording(&self, recording_sid: &str) -> Result<(), TelephonyError>;
}

/// Places outbound calls from the service number back into our own
/// incoming-call webhook.
#[derive(Clone)]
pub struct OutboundDialer {
    telephony: Arc<dyn Telephony>,
    public_url: String,
    from: String,
}

impl OutboundDialer {
    pub fn new(telephony: Arc<dyn Telephony>, public_url: &str, from: &str) -> Self {
        Self {
            telephony,
            public_url: public_url.to_owned(),
            from: from.to_owned(),
        }
    }

    /// Call `to`; returns the call sid.
    pub async fn dial(&self, to: &str) -> Result<String, TelephonyError> {
        let request = OutboundCallRequest::to_recipient(&self.public_url, &self.from, to);
        let sid = self.telephony.place_outbound_call(&request).await?;
        tracing::info!(to, call_sid = %sid, "outbound call placed");
        Ok(sid)
    }
}

impl std::fmt::Debug for OutboundDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundDialer")
            .field("public_url", &self.public_url)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}
