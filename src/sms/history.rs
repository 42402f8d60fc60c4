//! The client's SMS and call history flattened into prompt lines.

use chrono::{DateTime, Duration, Utc};

use crate::store::{RecordStore, Sender, Speaker, StoreResult, SummaryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Medium {
    Sms,
    Call,
}

impl Medium {
    fn label(self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Call => "Call",
        }
    }
}

#[derive(Debug)]
struct Entry {
    at: DateTime<Utc>,
    medium: Medium,
    from_user: bool,
    content: String,
}

impl Entry {
    fn line(&self) -> String {
        let who = if self.from_user { "User" } else { "Assistant" };
        format!("[{}] {who}: {}", self.medium.label(), self.content)
    }
}

/// Format the message being answered.
pub fn current_message_line(message: &str) -> String {
    format!("[SMS] User: {message}")
}

/// History lines for an SMS reply, oldest first: the SMS digests as one
/// block, then every text and call turn in time order.
///
/// Call turns are placed at the conversation start plus their offset.
/// `skip_message_id` drops the inbound text being answered.
pub async fn conversation_history(
    store: &dyn RecordStore,
    profile_id: &str,
    skip_message_id: Option<&str>,
) -> StoreResult<Vec<String>> {
    let mut digests = store.list_summaries(SummaryKind::Sms, profile_id).await?;
    digests.reverse();

    let mut entries: Vec<Entry> = store
        .list_messages(profile_id)
        .await?
        .into_iter()
        .filter(|m| Some(m.id.as_str()) != skip_message_id)
        .map(|m| Entry {
            at: m.created_at,
            medium: Medium::Sms,
            from_user: m.sender == Sender::User,
            content: m.content,
        })
        .collect();

    for conversation in store.list_conversations(profile_id).await? {
        let started = conversation.created_at;
        for turn in conversation.transcription.unwrap_or_default() {
            let offset = Duration::milliseconds((turn.timestamp.max(0.0) * 1000.0) as i64);
            entries.push(Entry {
                at: started + offset,
                medium: Medium::Call,
                from_user: turn.speaker == Speaker::User,
                content: turn.text,
            });
        }
    }
    // Stable, so same-instant entries keep texts before call turns.
    entries.sort_by_key(|e| e.at);

    let mut lines = Vec::with_capacity(entries.len() + 1);
    if !digests.is_empty() {
        let bullets: Vec<String> = digests.iter().map(|d| format!("- {}", d.content)).collect();
        lines.push(format!("SMS Conversation Summaries:\n{}", bullets.join("\n")));
    }
    lines.extend(entries.iter().map(Entry::line));
    Ok(lines)
}
