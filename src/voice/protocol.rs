//! Voice-engine websocket messages (JSON text, tagged by `type`).

use serde::Deserialize;
use serde_json::{Value, json};

use super::VoiceError;

/// Events received from the voice engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Session accepted; carries the engine conversation id.
    InitiationMetadata { conversation_id: String },
    UserTranscript(String),
    AgentResponse(String),
    /// Base64 audio to relay to the caller.
    Audio(String),
    Ping { event_id: u64 },
    Interruption,
    Error(String),
    /// `internal_*` and anything unrecognized.
    Ignored(String),
}

/// Wire shape of engine frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineFrame {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadataEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    Audio {
        audio_event: AudioEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    Interruption,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct InitiationMetadataEvent {
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct UserTranscriptionEvent {
    user_transcript: String,
}

#[derive(Debug, Deserialize)]
struct AgentResponseEvent {
    agent_response: String,
}

#[derive(Debug, Deserialize)]
struct AudioEvent {
    audio_base_64: String,
}

#[derive(Debug, Deserialize)]
struct PingEvent {
    event_id: u64,
}

impl EngineEvent {
    /// Parse one text frame from the engine.
    pub fn parse(raw: &str) -> Result<Self, VoiceError> {
        let protocol = |e: serde_json::Error| VoiceError::Protocol(e.to_string());
        let payload: Value = serde_json::from_str(raw).map_err(protocol)?;
        let frame = EngineFrame::deserialize(&payload).map_err(protocol)?;

        Ok(match frame {
            EngineFrame::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: e,
            } => Self::InitiationMetadata {
                conversation_id: e.conversation_id,
            },
            EngineFrame::UserTranscript {
                user_transcription_event: e,
            } => Self::UserTranscript(e.user_transcript),
            EngineFrame::AgentResponse {
                agent_response_event: e,
            } => Self::AgentResponse(e.agent_response),
            EngineFrame::Audio { audio_event } => Self::Audio(audio_event.audio_base_64),
            EngineFrame::Ping { ping_event } => Self::Ping {
                event_id: ping_event.event_id,
            },
            EngineFrame::Interruption => Self::Interruption,
            EngineFrame::Error { message } => {
                Self::Error(message.unwrap_or_else(|| payload.to_string()))
            }
            EngineFrame::Other => Self::Ignored(
                payload
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            ),
        })
    }
}

/// Messages sent to the voice engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// First message of a session: prompt, greeting and caller name.
    Initiate {
        prompt: String,
        first_message: String,
        user_name: String,
    },
    AudioChunk(String),
    Pong { event_id: u64 },
    /// Replace the system prompt mid-call.
    UpdatePrompt(String),
}

impl EngineCommand {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Initiate {
                prompt,
                first_message,
                user_name,
            } => json!({
                "type": "conversation_initiation_client_data",
                "conversation_config_override": {
                    "agent": {
                        "prompt": { "prompt": prompt },
                        "first_message": first_message,
                    }
                },
                "dynamic_variables": { "user_name": user_name },
            }),
            Self::AudioChunk(chunk) => json!({ "user_audio_chunk": chunk }),
            Self::Pong { event_id } => json!({ "type": "pong", "event_id": event_id }),
            Self::UpdatePrompt(prompt) => json!({
                "type": "conversation_config_override",
                "conversation_config_override": {
                    "agent": { "prompt": { "prompt": prompt } }
                },
            }),
        }
    }
}
