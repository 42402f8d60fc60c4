//! SMS webhook and the post-signup welcome trigger.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::{GatewayState, error_json, json_body, twiml_response};
use crate::notify::normalize_phone_number;
use crate::sms::SmsOutcome;
use crate::telephony::twiml;

const INVALID_SMS: &str = "Invalid request format: Missing phone number or message body.";

#[derive(Debug, Default, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "Body", default)]
    pub body: Option<String>,
}

/// Inbound SMS. Replies go out over the REST API, so the TwiML is empty.
pub async fn sms_webhook(State(state): State<GatewayState>, Form(form): Form<SmsForm>) -> Response {
    let outcome = state
        .sms
        .handle(form.from.as_deref(), form.body.as_deref())
        .await;
    tracing::debug!(?outcome, "sms handled");
    match outcome {
        SmsOutcome::Invalid => twiml_response(StatusCode::BAD_REQUEST, twiml::message(INVALID_SMS)),
        _ => twiml_response(StatusCode::OK, twiml::empty()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// `POST /api/welcome`: start the welcome sequence for a fresh signup.
/// The texts and call run in the background.
pub async fn welcome(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request: WelcomeRequest = match json_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let Some(raw) = request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "Phone number is required");
    };
    let phone = match normalize_phone_number(raw) {
        Ok(phone) => phone,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let profile = match state.calls.store.find_profile_by_phone(&phone).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::warn!(%phone, "welcome requested for unknown number");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Profile not found");
        }
        Err(e) => {
            tracing::error!(%phone, error = %e, "welcome profile lookup failed");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send welcome message");
        }
    };

    let sequence = state.welcome.clone();
    let first_name = request
        .first_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| Some(profile.first_name.clone()));
    tokio::spawn(async move {
        match sequence.run(&profile, first_name.as_deref()).await {
            Ok(call_sid) => tracing::info!(profile_id = %profile.id, %call_sid, "welcome sequence finished"),
            Err(e) => tracing::error!(profile_id = %profile.id, error = %e, "welcome sequence failed"),
        }
    });

    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}
