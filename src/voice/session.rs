//! Voice-engine websocket sessions.
//!
//! [`ConvaiEngine::connect`] opens the websocket and spawns a relay task that
//! owns both halves of the socket. Callers talk to it through an
//! [`EngineSession`]: commands go in over one channel, parsed events come out
//! of another. Dropping or closing the session ends the relay with a normal
//! close frame.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::VoiceError;
use super::protocol::{EngineCommand, EngineEvent};
use crate::config::VoiceEngineConfig;

const CHANNEL_CAPACITY: usize = 256;
const CLOSE_REASON: &str = "Session ended normally";

/// Opens voice-engine sessions for an agent persona.
#[async_trait]
pub trait VoiceEngine: Send + Sync {
    async fn connect(&self, agent_id: &str) -> Result<EngineSession, VoiceError>;
}

/// Handle to one open engine session.
#[derive(Debug)]
pub struct EngineSession {
    commands: mpsc::Sender<EngineCommand>,
    events: mpsc::Receiver<EngineEvent>,
    shutdown: CancellationToken,
}

impl EngineSession {
    /// Wrap channels driven by some relay (the websocket task, or a test).
    pub fn from_channels(
        commands: mpsc::Sender<EngineCommand>,
        events: mpsc::Receiver<EngineEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            commands,
            events,
            shutdown,
        }
    }

    pub async fn send(&self, command: EngineCommand) -> Result<(), VoiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VoiceError::Closed)
    }

    /// Next event; `None` once the engine side has closed.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Ask the relay to close the socket with a normal close frame.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// ElevenLabs-style conversational AI engine.
#[derive(Debug, Clone)]
pub struct ConvaiEngine {
    ws_url: String,
    api_key: String,
}

impl ConvaiEngine {
    pub fn new(config: &VoiceEngineConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn session_url(&self, agent_id: &str) -> Result<url::Url, VoiceError> {
        let mut url = url::Url::parse(&self.ws_url)
            .map_err(|e| VoiceError::Connect(format!("bad engine url: {e}")))?;
        url.query_pairs_mut().append_pair("agent_id", agent_id);
        Ok(url)
    }
}

#[async_trait]
impl VoiceEngine for ConvaiEngine {
    async fn connect(&self, agent_id: &str) -> Result<EngineSession, VoiceError> {
        if agent_id.trim().is_empty() {
            return Err(VoiceError::Connect("agent id is empty".to_owned()));
        }
        let url = self.session_url(agent_id)?;

        let mut request = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
            url.as_str(),
        )
        .map_err(|e| VoiceError::Connect(e.to_string()))?;
        if !self.api_key.is_empty() {
            let value = self
                .api_key
                .parse()
                .map_err(|_| VoiceError::Connect("api key is not a valid header".to_owned()))?;
            request.headers_mut().insert("xi-api-key", value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let agent = agent_id.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: CLOSE_REASON.into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            tracing::debug!(agent = %agent, error = %e, "engine close frame not sent");
                        }
                        break;
                    }
                    maybe_cmd = command_rx.recv() => {
                        let Some(cmd) = maybe_cmd else {
                            token.cancel();
                            continue;
                        };
                        let text = cmd.to_json().to_string();
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::warn!(agent = %agent, error = %e, "engine send failed");
                            break;
                        }
                    }
                    maybe_msg = read.next() => {
                        let raw = match maybe_msg {
                            Some(Ok(Message::Text(text))) => text.to_string(),
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!(agent = %agent, ?frame, "engine closed session");
                                break;
                            }
                            None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::warn!(agent = %agent, error = %e, "engine websocket error");
                                break;
                            }
                        };
                        match EngineEvent::parse(&raw) {
                            Ok(event) => {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(agent = %agent, error = %e, "dropping malformed engine frame"),
                        }
                    }
                }
            }
        });

        tracing::info!(agent_id, "voice engine session opened");
        Ok(EngineSession::from_channels(command_tx, event_rx, shutdown))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn session_url_appends_agent() {
        let engine = ConvaiEngine::new(&VoiceEngineConfig::default());
        let url = engine.session_url("agent_123").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_123"
        );
    }

    #[tokio::test]
    async fn empty_agent_is_rejected() {
        let engine = ConvaiEngine::new(&VoiceEngineConfig::default());
        assert!(matches!(
            engine.connect(" ").await.unwrap_err(),
            VoiceError::Connect(_)
        ));
    }

    #[tokio::test]
    async fn channel_session_round_trip() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let (evt_tx, evt_rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let mut session = EngineSession::from_channels(cmd_tx, evt_rx, token.clone());

        session
            .send(EngineCommand::AudioChunk("QUJD".into()))
            .await
            .unwrap();
        assert_eq!(
            cmd_rx.recv().await,
            Some(EngineCommand::AudioChunk("QUJD".into()))
        );

        evt_tx.send(EngineEvent::Interruption).await.unwrap();
        assert_eq!(session.next_event().await, Some(EngineEvent::Interruption));

        drop(session);
        assert!(token.is_cancelled());
    }
}
