//! Calls known to the gateway: announced by the incoming-call webhook but
//! not streaming yet, and live calls with a running session task.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::store::Profile;

/// Registered by the incoming-call webhook, consumed by the stream `start`.
#[derive(Debug, Clone)]
pub struct PendingCall {
    /// Caller number (or recipient for outbound calls).
    pub phone: String,
    /// Profile looked up when the webhook fired.
    pub profile: Option<Profile>,
    pub outbound: bool,
    pub registered_at: DateTime<Utc>,
}

/// Pending calls keyed by call sid.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<String, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, call_sid: &str, call: PendingCall) {
        tracing::debug!(call_sid, phone = %call.phone, "pending call registered");
        self.calls.insert(call_sid.to_owned(), call);
    }

    /// Remove and return the pending call for `call_sid`.
    pub fn take(&self, call_sid: &str) -> Option<PendingCall> {
        self.calls.remove(call_sid).map(|(_, call)| call)
    }

    pub fn remove(&self, call_sid: &str) {
        self.calls.remove(call_sid);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Signals delivered to a running call session from outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallControl {
    /// Answering-machine detection fired.
    Voicemail,
    /// The agent's hang-up tool was invoked.
    HangUp,
}

#[derive(Debug, Clone)]
struct LiveCall {
    phone: Option<String>,
    engine_conversation_id: Option<String>,
    control: mpsc::Sender<CallControl>,
}

/// Live call sessions keyed by call sid.
#[derive(Debug, Default)]
pub struct LiveCalls {
    calls: DashMap<String, LiveCall>,
}

impl LiveCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, call_sid: &str, phone: Option<String>, control: mpsc::Sender<CallControl>) {
        self.calls.insert(
            call_sid.to_owned(),
            LiveCall {
                phone,
                engine_conversation_id: None,
                control,
            },
        );
    }

    pub fn set_engine_conversation(&self, call_sid: &str, engine_conversation_id: &str) {
        if let Some(mut call) = self.calls.get_mut(call_sid) {
            call.engine_conversation_id = Some(engine_conversation_id.to_owned());
        }
    }

    pub fn remove(&self, call_sid: &str) {
        self.calls.remove(call_sid);
    }

    pub fn contains(&self, call_sid: &str) -> bool {
        self.calls.contains_key(call_sid)
    }

    /// Call sid of the live call attached to an engine conversation.
    pub fn call_for_engine_conversation(&self, engine_conversation_id: &str) -> Option<String> {
        self.calls
            .iter()
            .find(|entry| entry.engine_conversation_id.as_deref() == Some(engine_conversation_id))
            .map(|entry| entry.key().clone())
    }

    /// Call sids of live calls with this phone number.
    pub fn calls_for_phone(&self, phone: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|entry| entry.phone.as_deref() == Some(phone))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Deliver `signal` to the session. Returns `false` when the call is
    /// unknown or its session has already ended.
    pub async fn signal(&self, call_sid: &str, signal: CallControl) -> bool {
        let Some(control) = self.calls.get(call_sid).map(|c| c.control.clone()) else {
            return false;
        };
        control.send(signal).await.is_ok()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
