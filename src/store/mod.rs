//! Record store: the single durable source of truth.
//!
//! Components talk to [`RecordStore`]; [`SqliteRecordStore`] is the bundled
//! implementation. Accessors are point lookups, ordered scans by profile and
//! creation time, inserts, update-by-id and delete-by-id-set.

pub mod schema;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub use sqlite::SqliteRecordStore;
pub use types::{
    CombinedSummary, Conversation, ConversationType, Message, NewConversation, NewProfile,
    NewScheduledCall, Note, Profile, ScheduledCall, Sender, Speaker, Summary, SummaryKind,
    TranscriptTurn,
};

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("lock poisoned")]
    Lock,
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Convenience alias for store results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Typed accessors over the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Profiles ──────────────────────────────────────────────

    async fn insert_profile(
        &self,
        profile: &NewProfile,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Profile>;
    async fn get_profile(&self, id: &str) -> StoreResult<Option<Profile>>;
    async fn find_profile_by_phone(&self, phone: &str) -> StoreResult<Option<Profile>>;
    async fn list_profiles(&self) -> StoreResult<Vec<Profile>>;

    // ── Conversations ─────────────────────────────────────────

    async fn create_conversation(&self, new: &NewConversation) -> StoreResult<Conversation>;
    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>>;
    /// Most recently created conversation for the profile.
    async fn latest_conversation(&self, profile_id: &str) -> StoreResult<Option<Conversation>>;
    /// All conversations for the profile, oldest first.
    async fn list_conversations(&self, profile_id: &str) -> StoreResult<Vec<Conversation>>;
    async fn conversations_on_date(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<Conversation>>;
    /// Count of coach-persona conversations that did not go to voicemail.
    async fn count_coach_conversations(&self, profile_id: &str) -> StoreResult<usize>;
    /// Distinct profile ids that have at least one conversation.
    async fn profile_ids_with_conversations(&self) -> StoreResult<Vec<String>>;
    async fn set_voicemail(&self, conversation_id: &str, voicemail: bool) -> StoreResult<()>;
    async fn set_call_recording(&self, conversation_id: &str, url: &str) -> StoreResult<()>;
    async fn set_transcription(
        &self,
        conversation_id: &str,
        turns: &[TranscriptTurn],
    ) -> StoreResult<()>;

    // ── Messages ──────────────────────────────────────────────

    async fn insert_message(
        &self,
        profile_id: &str,
        content: &str,
        sender: Sender,
    ) -> StoreResult<Message>;
    /// All messages for the profile, oldest first.
    async fn list_messages(&self, profile_id: &str) -> StoreResult<Vec<Message>>;

    // ── Summaries ─────────────────────────────────────────────

    async fn insert_summary(
        &self,
        kind: SummaryKind,
        profile_id: &str,
        conversation_id: Option<&str>,
        content: &str,
    ) -> StoreResult<Summary>;
    /// Store a short and a detailed summary together; neither is kept if
    /// either insert fails.
    async fn insert_summary_pair(
        &self,
        profile_id: &str,
        conversation_id: &str,
        short: &str,
        detailed: &str,
    ) -> StoreResult<()>;
    /// Summaries of one kind, newest first.
    async fn list_summaries(&self, kind: SummaryKind, profile_id: &str)
    -> StoreResult<Vec<Summary>>;

    // ── Entities / action items ───────────────────────────────

    async fn insert_entities(
        &self,
        profile_id: &str,
        conversation_id: &str,
        contents: &[String],
    ) -> StoreResult<usize>;
    /// Entities newest first.
    async fn list_entities(&self, profile_id: &str) -> StoreResult<Vec<Note>>;
    async fn insert_action_items(
        &self,
        profile_id: &str,
        conversation_id: &str,
        contents: &[String],
    ) -> StoreResult<usize>;
    async fn list_action_items(&self, profile_id: &str) -> StoreResult<Vec<Note>>;

    // ── Scheduled calls ───────────────────────────────────────

    async fn insert_scheduled_call(&self, new: &NewScheduledCall) -> StoreResult<ScheduledCall>;
    /// Scheduled calls for the profile, newest first.
    async fn list_scheduled_calls(&self, profile_id: &str) -> StoreResult<Vec<ScheduledCall>>;
    async fn scheduled_calls_on_dates(&self, dates: &[NaiveDate])
    -> StoreResult<Vec<ScheduledCall>>;
    /// Flag the invitation as sent and remember its calendar UID.
    async fn mark_invite_sent(&self, id: &str, event_uid: &str) -> StoreResult<()>;
    async fn mark_reminder_sent(&self, id: &str) -> StoreResult<()>;
    async fn mark_no_show(&self, id: &str) -> StoreResult<()>;
    async fn delete_scheduled_calls(&self, ids: &[String]) -> StoreResult<usize>;
}

/// Short and detailed summaries merged by conversation, newest first.
pub async fn combined_summaries(
    store: &dyn RecordStore,
    profile_id: &str,
) -> StoreResult<Vec<CombinedSummary>> {
    let shorts = store.list_summaries(SummaryKind::Short, profile_id).await?;
    let detailed = store
        .list_summaries(SummaryKind::Detailed, profile_id)
        .await?;

    let mut merged: Vec<CombinedSummary> = Vec::new();
    for s in shorts {
        let key = s.conversation_id.clone().unwrap_or_else(|| s.id.clone());
        merged.push(CombinedSummary {
            conversation_id: key,
            short: Some(s.content),
            detailed: None,
            created_at: s.created_at,
        });
    }
    for d in detailed {
        let key = d.conversation_id.clone().unwrap_or_else(|| d.id.clone());
        if let Some(existing) = merged.iter_mut().find(|m| m.conversation_id == key) {
            existing.detailed = Some(d.content);
        } else {
            merged.push(CombinedSummary {
                conversation_id: key,
                short: None,
                detailed: Some(d.content),
                created_at: d.created_at,
            });
        }
    }
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(merged)
}
