//! Record types persisted by the record store.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version stamped into `schema_meta`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A registered client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// E.164 phone number.
    pub phone: String,
    /// IANA timezone name (e.g. `America/Toronto`).
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// `"First Last"`, falling back to the email, then the first name.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned();
        if !name.is_empty() {
            return name;
        }
        self.email.clone().unwrap_or_default()
    }
}

/// Fields for a new profile.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub timezone: String,
}

/// Which persona handled a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationType {
    /// The coach persona (discovery and scheduled coaching calls).
    ScheduledCoach,
    /// The assistant persona (unscheduled calls).
    Assistant,
}

impl ConversationType {
    /// Storage discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduledCoach => "scheduled-coach",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a storage discriminator.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled-coach" => Some(Self::ScheduledCoach),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Speaker label on a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Coach,
}

/// One turn of a call transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub text: String,
    pub speaker: Speaker,
    /// Seconds since the call started.
    pub timestamp: f64,
}

/// A phone call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub profile_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub kind: ConversationType,
    pub voicemail: bool,
    pub transcription: Option<Vec<TranscriptTurn>>,
    pub call_recording: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new conversation.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub profile_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub kind: ConversationType,
}

/// Who wrote an SMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw == "user" { Self::User } else { Self::Ai }
    }
}

/// One SMS in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub profile_id: String,
    pub content: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
}

/// An upcoming call slot. At most one survives reconciliation per profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub id: String,
    pub profile_id: String,
    pub date: NaiveDate,
    /// `HH:MM:SS±HH:MM`.
    pub time: String,
    pub calendar_invite_sent: bool,
    /// Calendar event UID of the invitation, reused when rescheduling.
    pub event_uid: Option<String>,
    pub reminder_sent: bool,
    pub no_show: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new scheduled call.
#[derive(Debug, Clone)]
pub struct NewScheduledCall {
    pub profile_id: String,
    pub date: NaiveDate,
    pub time: String,
}

/// Which of the three summary tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Short,
    Detailed,
    Sms,
}

impl SummaryKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Short => "summaries_short",
            Self::Detailed => "summaries_detailed",
            Self::Sms => "summaries_sms",
        }
    }
}

/// A stored summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub profile_id: String,
    pub conversation_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only fact or action item attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub profile_id: String,
    pub conversation_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Short and detailed summaries merged per conversation, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSummary {
    pub conversation_id: String,
    pub short: Option<String>,
    pub detailed: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Generate a new record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
