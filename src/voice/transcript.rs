//! Transcript retrieval from the voice engine's REST API.

use async_trait::async_trait;
use serde::Deserialize;

use super::VoiceError;
use crate::config::VoiceEngineConfig;
use crate::store::{Speaker, TranscriptTurn};

/// Source of finished-call transcripts.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Transcript of an engine conversation, in call order.
    async fn fetch_transcript(
        &self,
        engine_conversation_id: &str,
    ) -> Result<Vec<TranscriptTurn>, VoiceError>;
}

#[derive(Debug, Deserialize)]
struct ConversationBody {
    #[serde(default)]
    transcript: Vec<RawTurn>,
}

#[derive(Debug, Deserialize)]
struct RawTurn {
    role: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    time_in_call_secs: f64,
}

/// HTTP client for `GET /v1/convai/conversations/{id}`.
#[derive(Debug, Clone)]
pub struct ConvaiTranscripts {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ConvaiTranscripts {
    pub fn new(config: &VoiceEngineConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }
}

/// Map engine turns onto stored turns. Only `user` is the caller; every
/// other role is the coach. Turns without text are dropped.
fn map_turns(raw: Vec<RawTurn>) -> Vec<TranscriptTurn> {
    raw.into_iter()
        .filter_map(|turn| {
            let text = turn.message?.trim().to_owned();
            if text.is_empty() {
                return None;
            }
            let speaker = if turn.role == "user" {
                Speaker::User
            } else {
                Speaker::Coach
            };
            Some(TranscriptTurn {
                text,
                speaker,
                timestamp: turn.time_in_call_secs,
            })
        })
        .collect()
}

#[async_trait]
impl TranscriptSource for ConvaiTranscripts {
    async fn fetch_transcript(
        &self,
        engine_conversation_id: &str,
    ) -> Result<Vec<TranscriptTurn>, VoiceError> {
        let url = format!(
            "{}/v1/convai/conversations/{}",
            self.base_url,
            urlencoding::encode(engine_conversation_id)
        );
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: ConversationBody = response
            .json()
            .await
            .map_err(|e| VoiceError::Protocol(e.to_string()))?;
        Ok(map_turns(body.transcript))
    }
}
