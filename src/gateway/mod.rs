//! HTTP gateway: telephony webhooks, the media-stream websocket, the voice
//! agent's tool endpoint, the SMS webhook and signup welcome.

pub mod calls;
pub mod messaging;
pub mod tools;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::blob::{BlobError, LocalBlobStore};
use crate::call::CallServices;
use crate::error::{CoachError, Result};
use crate::llm::Providers;
use crate::sms::{SmsHandler, WelcomeSequence};

/// Shared state behind every route.
#[derive(Clone)]
pub struct GatewayState {
    pub calls: Arc<CallServices>,
    pub sms: Arc<SmsHandler>,
    pub welcome: Arc<WelcomeSequence>,
    pub blobs: Arc<LocalBlobStore>,
    /// Backs the agent's web search tool.
    pub providers: Providers,
    /// Host used in stream URLs when the request carries no `Host` header.
    pub public_host: String,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("public_host", &self.public_host)
            .finish_non_exhaustive()
    }
}

/// Host part of a public base URL (`https://coach.example/` → `coach.example`).
pub fn host_of(public_url: &str) -> String {
    url::Url::parse(public_url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_owned();
            Some(match u.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .unwrap_or_else(|| public_url.trim_end_matches('/').to_owned())
}

/// Every route the service exposes.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/incoming-call", any(calls::incoming_call))
        .route("/media-stream", get(calls::media_stream))
        .route("/amd-status-callback", post(calls::amd_status))
        .route("/recording-callback", post(calls::status_ack))
        .route("/call-status-callback", post(calls::status_ack))
        .route("/api/tools/hang-up", post(calls::hang_up_tool))
        .route("/api/tools/search-the-web", post(tools::search_the_web))
        .route("/api/tools/{technique}", get(tools::coaching_technique))
        .route("/sms", post(messaging::sms_webhook))
        .route("/api/sms/webhook", post(messaging::sms_webhook))
        .route("/api/welcome", post(messaging::welcome))
        .route("/api/sms/welcome", post(messaging::welcome))
        .route("/blobs/{bucket}/{name}", get(signed_blob))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// XML response with the TwiML content type.
pub(crate) fn twiml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

/// `{"error": message}` with `status`.
pub(crate) fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Decode a JSON request body whatever its content type. Malformed bodies
/// become a 400 with a JSON error.
pub(crate) fn json_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> std::result::Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        error_json(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}"))
    })
}

#[derive(Debug, serde::Deserialize)]
struct SignedQuery {
    expires: i64,
    signature: String,
}

async fn signed_blob(
    State(state): State<GatewayState>,
    Path((bucket, name)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Response {
    let now = chrono::Utc::now().timestamp();
    match state
        .blobs
        .read_signed(&bucket, &name, query.expires, &query.signature, now)
        .await
    {
        Ok(bytes) => {
            let content_type = if name.ends_with(".wav") {
                "audio/wav"
            } else {
                "application/octet-stream"
            };
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(BlobError::BadSignature | BlobError::Expired) => StatusCode::FORBIDDEN.into_response(),
        Err(BlobError::InvalidName(_)) => StatusCode::BAD_REQUEST.into_response(),
        Err(BlobError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            tracing::error!(%bucket, %name, error = %e, "serving blob failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The gateway running on a background task.
pub struct GatewayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl GatewayServer {
    /// Bind `{host}:{port}` (port `0` picks one) and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(state: GatewayState, host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(format!("{host}:{port}"))
            .await
            .map_err(|e| CoachError::Config(format!("gateway bind failed: {e}")))?;
        let addr = listener.local_addr()?;
        tracing::info!("gateway listening on http://{addr}");

        let app = router(state);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("gateway server error: {e}");
            }
        });
        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server task to end.
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.handle).await
            && !e.is_cancelled()
        {
            tracing::error!("gateway task failed: {e}");
        }
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Gateway over fakes with Ada's profile on file. SMS prompts are answered
/// by system prompt: "NO" to call requests, no rescheduling, and a fixed
/// coaching reply.
#[cfg(test)]
pub(crate) async fn test_state() -> (
    GatewayState,
    Arc<crate::test_utils::FakeTelephony>,
    crate::store::Profile,
) {
    use crate::config::CoachConfig;
    use crate::llm::{GenerationRequest, ProviderError};
    use crate::services::{Collaborators, Services};
    use crate::test_utils::{
        FakeMailer, FakeTelephony, FakeTranscripts, FakeVoiceEngine, ScriptedProvider, providers,
        store_with_profile,
    };

    let answer = |req: &GenerationRequest| -> std::result::Result<String, ProviderError> {
        if req.system.contains("ONLY 'YES' or 'NO'") {
            Ok("NO".to_owned())
        } else if req.system.contains("rescheduling requests") {
            Ok(r#"{"wantsToReschedule": false, "newCallTime": null}"#.to_owned())
        } else {
            Ok("Keep going, Ada.".to_owned())
        }
    };
    let (store, profile) = store_with_profile(None).await;
    let telephony = Arc::new(FakeTelephony::default());
    let root = std::env::temp_dir().join(format!("coachline-gateway-{}", uuid::Uuid::new_v4()));

    let mut config = CoachConfig::default();
    config.server.public_url = "https://coach.example".to_owned();
    let services = Services::assemble(
        &config,
        Collaborators {
            providers: providers(
                ScriptedProvider::new("anthropic", answer),
                ScriptedProvider::new("openai", answer),
            ),
            store,
            telephony: telephony.clone(),
            engine: Arc::new(FakeVoiceEngine::default()),
            transcripts: Arc::new(FakeTranscripts::default()),
            mailer: Arc::new(FakeMailer::default()),
            blobs: Arc::new(LocalBlobStore::new(root, "https://coach.example/blobs", "secret")),
        },
    );
    (services.gateway, telephony, profile)
}
