//! Classifying an inbound text: call requests and reschedule requests.

use dashmap::DashSet;
use serde::Deserialize;

use crate::llm::json::parse_json_object;
use crate::llm::{GenerationRequest, Providers, generate_or_none};

const CALL_REQUEST_SYSTEM: &str =
    "You are a message analyzer. You must respond with ONLY 'YES' or 'NO', with no additional text.";

const RESCHEDULE_SYSTEM: &str = "You are an AI assistant analyzing messages to detect rescheduling \
requests. Respond with valid JSON only.";

/// Whether the client is asking to be called right now.
///
/// Anything other than a bare `YES`, including a provider failure, is a no.
pub async fn is_call_request(providers: &Providers, message: &str) -> bool {
    let request = GenerationRequest::new(
        CALL_REQUEST_SYSTEM,
        format!(
            "Analyze this message and determine if the user is requesting an immediate phone call.
Answer ONLY with YES if the user is clearly requesting to have a call with you (now, right now, asap, etc.) or NO if not.
Do not explain your reasoning, just answer YES or NO.

Message: \"{message}\""
        ),
    )
    .with_temperature(0.0)
    .with_max_tokens(1);

    generate_or_none(providers.prose(), &request, "call request")
        .await
        .is_some_and(|answer| answer.trim() == "YES")
}

/// Result of reschedule detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleIntent {
    #[serde(default)]
    pub wants_to_reschedule: bool,
    /// The new time in the client's own words, e.g. "Next Thursday at 3pm".
    #[serde(default)]
    pub new_call_time: Option<String>,
}

impl RescheduleIntent {
    /// The requested time, if one was actually given.
    pub fn requested_time(&self) -> Option<&str> {
        self.new_call_time
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Ask the structured provider whether the text is a (re)schedule request.
/// Failures read as "not rescheduling".
pub async fn analyze_reschedule(providers: &Providers, message: &str) -> RescheduleIntent {
    let request = GenerationRequest::new(
        RESCHEDULE_SYSTEM,
        format!(
            "Analyze this message and determine if the user is requesting to reschedule their call or schedule a new one.
If the user is requesting to reschedule, extract the new call time from the message.
If the user is requesting to schedule a new call, extract the new call time from the message.
If the user is not requesting to reschedule or schedule a new call, respond with false and null for newCallTime.
Answer ONLY with a JSON object: {{ \"wantsToReschedule\": true/false, \"newCallTime\": string }}

The new call time should be just how the user says it, example: {{ \"wantsToReschedule\": true, \"newCallTime\": \"Next Thursday at 3pm\" }}

Message: \"{message}\""
        ),
    )
    .with_temperature(0.0)
    .json();

    let Some(raw) = generate_or_none(providers.structured(), &request, "reschedule intent").await
    else {
        return RescheduleIntent::default();
    };
    match parse_json_object::<RescheduleIntent>(&raw) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!(error = %e, "reschedule intent unparseable");
            RescheduleIntent::default()
        }
    }
}

/// Phone numbers we asked "what time works?" and are waiting on.
#[derive(Debug, Default)]
pub struct RescheduleIntents {
    awaiting: DashSet<String>,
}

impl RescheduleIntents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_awaiting(&self, phone: &str) {
        self.awaiting.insert(phone.to_owned());
    }

    pub fn is_awaiting(&self, phone: &str) -> bool {
        self.awaiting.contains(phone)
    }

    /// Clear the flag; returns whether it was set.
    pub fn clear(&self, phone: &str) -> bool {
        self.awaiting.remove(phone).is_some()
    }

    pub fn len(&self) -> usize {
        self.awaiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.awaiting.is_empty()
    }
}
