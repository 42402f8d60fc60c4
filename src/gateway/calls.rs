//! Voice routes: call setup, the media-stream bridge and out-of-band control.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{GatewayState, error_json, json_body, twiml_response};
use crate::call::{AnsweredBy, CallServices, CallSession, HangUpError, PendingCall, hang_up, mark_voicemail};
use crate::notify::normalize_phone_number;
use crate::telephony::twiml;

// ── Incoming call ──

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingQuery {
    #[serde(default)]
    pub is_outbound: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
}

impl IncomingQuery {
    fn outbound(&self) -> bool {
        self.is_outbound.as_deref() == Some("true")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallForm {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
}

/// Remember who is on the line and point the call audio at our stream.
pub async fn incoming_call(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<IncomingQuery>,
    Form(form): Form<CallForm>,
) -> Response {
    let outbound = query.outbound();
    // On outbound calls `From` is our own number.
    let raw_phone = if outbound {
        query.recipient_phone.as_deref()
    } else {
        form.from.as_deref()
    };

    if let (Some(call_sid), Some(raw)) = (form.call_sid.as_deref(), raw_phone) {
        register_caller(&state.calls, call_sid, raw, outbound).await;
    } else {
        tracing::warn!(?form, outbound, "incoming call without sid or phone");
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or(state.public_host.as_str());
    twiml_response(StatusCode::OK, twiml::connect_stream(host))
}

async fn register_caller(services: &CallServices, call_sid: &str, raw_phone: &str, outbound: bool) {
    let phone = normalize_phone_number(raw_phone).unwrap_or_else(|_| raw_phone.trim().to_owned());
    let profile = match services.store.find_profile_by_phone(&phone).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(call_sid, error = %e, "caller lookup failed");
            None
        }
    };
    tracing::info!(
        call_sid,
        outbound,
        known = profile.is_some(),
        "call incoming"
    );
    services.pending.register(
        call_sid,
        PendingCall {
            phone,
            profile,
            outbound,
            registered_at: Utc::now(),
        },
    );
}

// ── Media stream ──

pub async fn media_stream(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let services = state.calls.clone();
    ws.on_upgrade(move |socket| bridge_media(socket, services))
}

/// Pump telephony frames into a [`CallSession`] and its replies back out.
async fn bridge_media(socket: WebSocket, services: Arc<CallServices>) {
    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("media stream read error: {e}");
                    break;
                }
            }
        }
    });

    let plan = CallSession::new(services, outbound_tx).run(inbound_rx).await;
    tracing::debug!(finished = plan.is_some(), "media stream session ended");
    reader.abort();
    // The session dropped its sender, so the writer drains and exits.
    if let Err(e) = writer.await
        && !e.is_cancelled()
    {
        tracing::warn!("media stream writer failed: {e}");
    }
}

// ── Answering-machine detection ──

#[derive(Debug, Default, Deserialize)]
pub struct AmdQuery {
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AmdForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "AnsweredBy", default)]
    pub answered_by: Option<String>,
}

/// A voicemail greeting flags the conversation and ends the call.
pub async fn amd_status(
    State(state): State<GatewayState>,
    Query(query): Query<AmdQuery>,
    Form(form): Form<AmdForm>,
) -> Response {
    let answered_by = AnsweredBy::parse(form.answered_by.as_deref().unwrap_or_default());
    tracing::info!(call_sid = ?form.call_sid, ?answered_by, "answering machine detection");

    let (AnsweredBy::Machine, Some(call_sid)) = (answered_by, form.call_sid.as_deref()) else {
        return twiml_response(StatusCode::OK, twiml::empty());
    };

    let services = &state.calls;
    if let Some(raw) = query.phone.as_deref() {
        let phone = normalize_phone_number(raw).unwrap_or_else(|_| raw.trim().to_owned());
        if let Err(e) = mark_voicemail(services.store.as_ref(), &services.live, call_sid, &phone).await {
            tracing::error!(call_sid, error = %e, "marking voicemail failed");
        }
    }
    if let Err(e) = services.telephony.complete_call(call_sid).await {
        tracing::error!(call_sid, error = %e, "ending voicemail call failed");
    }
    twiml_response(StatusCode::OK, twiml::hangup())
}

/// Recording and call status callbacks only need an acknowledgement.
pub async fn status_ack() -> Response {
    twiml_response(StatusCode::OK, twiml::empty())
}

// ── Agent tools ──

#[derive(Debug, Default, Deserialize)]
pub struct HangUpRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// `POST /api/tools/hang-up` from the voice agent.
pub async fn hang_up_tool(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request: HangUpRequest = match json_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let Some(conversation_id) = request.conversation_id.as_deref().filter(|id| !id.is_empty())
    else {
        return error_json(StatusCode::BAD_REQUEST, "conversation_id is required");
    };

    let services = &state.calls;
    match hang_up(&services.live, services.telephony.as_ref(), conversation_id).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Call ended successfully" })),
        )
            .into_response(),
        Err(HangUpError::NotFound(id)) => error_json(
            StatusCode::NOT_FOUND,
            &format!("No active call found for conversation {id}"),
        ),
        Err(HangUpError::Telephony(e)) => {
            tracing::error!(conversation_id, error = %e, "hang-up failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to end call")
        }
    }
}
