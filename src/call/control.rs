//! Out-of-band call control: answering-machine detection and the agent's
//! hang-up tool.

use thiserror::Error;

use super::registry::{CallControl, LiveCalls};
use crate::store::{RecordStore, StoreResult};
use crate::telephony::{Telephony, TelephonyError};

/// What the answering-machine callback reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsweredBy {
    Human,
    /// `machine_start`: a voicemail greeting began.
    Machine,
    Unknown,
}

impl AnsweredBy {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "human" => Self::Human,
            "machine_start" => Self::Machine,
            _ => Self::Unknown,
        }
    }
}

/// Flag the caller's latest conversation as voicemail and tell the live
/// session, so teardown sends the missed-call text instead of running
/// analysis. Returns `false` when the number has no profile.
pub async fn mark_voicemail(
    store: &dyn RecordStore,
    live: &LiveCalls,
    call_sid: &str,
    phone: &str,
) -> StoreResult<bool> {
    let Some(profile) = store.find_profile_by_phone(phone).await? else {
        tracing::warn!(phone, "voicemail for unknown number");
        return Ok(false);
    };
    match store.latest_conversation(&profile.id).await? {
        Some(conversation) => {
            store.set_voicemail(&conversation.id, true).await?;
            tracing::info!(conversation_id = %conversation.id, "conversation marked as voicemail");
        }
        None => tracing::warn!(profile_id = %profile.id, "no conversation to mark as voicemail"),
    }

    let mut targets = vec![call_sid.to_owned()];
    if !live.contains(call_sid) {
        targets = live.calls_for_phone(phone);
    }
    for target in targets {
        if live.signal(&target, CallControl::Voicemail).await {
            tracing::info!(call_sid = %target, "live call flagged as voicemail");
        }
    }
    Ok(true)
}

#[derive(Debug, Error)]
pub enum HangUpError {
    #[error("no active call for conversation {0}")]
    NotFound(String),
    #[error(transparent)]
    Telephony(#[from] TelephonyError),
}

/// End the call attached to an engine conversation: close the engine side,
/// then complete the telephony call. Returns the call sid.
pub async fn hang_up(
    live: &LiveCalls,
    telephony: &dyn Telephony,
    engine_conversation_id: &str,
) -> Result<String, HangUpError> {
    let call_sid = live
        .call_for_engine_conversation(engine_conversation_id)
        .ok_or_else(|| HangUpError::NotFound(engine_conversation_id.to_owned()))?;
    live.signal(&call_sid, CallControl::HangUp).await;
    telephony.complete_call(&call_sid).await?;
    tracing::info!(call_sid = %call_sid, "call ended by agent");
    Ok(call_sid)
}
