//! System prompts for the coach and assistant personas and SMS replies.
//!
//! Prompt text lives in `prompts/*.md` and is compiled in; per-profile data
//! is layered on top with [`PromptBuilder`].

pub mod assistant;
pub mod builder;
pub mod coach;
pub mod sms;

use chrono::{DateTime, Utc};

pub use builder::{PromptBuilder, Section, render};

use crate::config::PersonaConfig;
use crate::scheduling::lookup::{UpcomingCall, upcoming_scheduled_call};
use crate::store::{
    CombinedSummary, Profile, RecordStore, Speaker, StoreResult, SummaryKind, TranscriptTurn,
    combined_summaries,
};

/// Everything the prompts know about a client.
#[derive(Debug, Clone)]
pub struct ProfileContext {
    pub profile: Profile,
    /// Extracted facts, newest first.
    pub entities: Vec<String>,
    /// Call summaries, newest first.
    pub summaries: Vec<CombinedSummary>,
    /// SMS digests, oldest first.
    pub sms_summaries: Vec<String>,
    /// Completed coach calls (voicemail excluded).
    pub coach_call_count: usize,
    pub upcoming: Option<UpcomingCall>,
}

impl ProfileContext {
    pub async fn load(
        store: &dyn RecordStore,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<Self> {
        let entities = store
            .list_entities(&profile.id)
            .await?
            .into_iter()
            .map(|n| n.content)
            .collect();
        let summaries = combined_summaries(store, &profile.id).await?;
        let mut sms_summaries: Vec<String> = store
            .list_summaries(SummaryKind::Sms, &profile.id)
            .await?
            .into_iter()
            .map(|s| s.content)
            .collect();
        sms_summaries.reverse();
        let coach_call_count = store.count_coach_conversations(&profile.id).await?;
        let upcoming = upcoming_scheduled_call(store, &profile.id, now).await?;

        Ok(Self {
            profile: profile.clone(),
            entities,
            summaries,
            sms_summaries,
            coach_call_count,
            upcoming,
        })
    }

    /// Context with no history, for a brand-new profile.
    pub fn empty(profile: Profile) -> Self {
        Self {
            profile,
            entities: Vec::new(),
            summaries: Vec::new(),
            sms_summaries: Vec::new(),
            coach_call_count: 0,
            upcoming: None,
        }
    }

    fn key_information_title(&self) -> String {
        format!("KEY INFORMATION ABOUT {}", self.profile.first_name.to_uppercase())
    }

    /// Short summaries of every call but the latest.
    fn previous_short_summaries(&self) -> Vec<String> {
        self.summaries
            .iter()
            .skip(1)
            .filter_map(|s| s.short.clone())
            .collect()
    }

    fn last_detailed_summary(&self) -> Option<String> {
        self.summaries.first().and_then(|s| s.detailed.clone())
    }

    fn bulleted_sms_summaries(&self) -> Vec<String> {
        self.sms_summaries.iter().map(|s| format!("- {s}")).collect()
    }
}

/// Template variables shared by every persona prompt.
pub fn persona_vars(persona: &PersonaConfig) -> [(&'static str, &str); 5] {
    [
        ("coach", persona.coach_name.as_str()),
        ("coach_short", persona.coach_short_name.as_str()),
        ("assistant", persona.assistant_name.as_str()),
        ("signup_url", persona.signup_url.as_str()),
        ("support_email", persona.support_email.as_str()),
    ]
}

/// Render a transcript as `Speaker: text` lines.
pub fn render_transcript(turns: &[TranscriptTurn], coach_label: &str) -> String {
    turns
        .iter()
        .map(|t| {
            let speaker = match t.speaker {
                Speaker::User => "User",
                Speaker::Coach => coach_label,
            };
            format!("{speaker}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::{store_with_profile, transcript};

    #[test]
    fn transcript_lines_use_labels() {
        let turns = transcript(&["Hi Ada", "Hello Max"]);
        assert_eq!(render_transcript(&turns, "Maximo"), "Maximo: Hi Ada\nUser: Hello Max");
    }

    #[tokio::test]
    async fn context_loads_history() {
        let (store, profile) = store_with_profile(None).await;
        store
            .insert_entities(&profile.id, "c1", &["Works at Acme.".to_owned()])
            .await
            .unwrap();
        store
            .insert_summary(SummaryKind::Sms, &profile.id, None, "first digest")
            .await
            .unwrap();
        store
            .insert_summary(SummaryKind::Sms, &profile.id, None, "second digest")
            .await
            .unwrap();

        let ctx = ProfileContext::load(store.as_ref(), &profile, Utc::now())
            .await
            .unwrap();
        assert_eq!(ctx.entities, vec!["Works at Acme.".to_owned()]);
        assert_eq!(ctx.sms_summaries, vec!["first digest", "second digest"]);
        assert_eq!(ctx.coach_call_count, 0);
        assert!(ctx.upcoming.is_none());
    }
}
