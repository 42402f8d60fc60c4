//! Everything that runs after a coaching call hangs up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::action_items::extract_action_items;
use super::ending::classify_ending;
use super::entities::extract_entities;
use super::post_call::create_post_call_message;
use super::summaries::generate_summaries;
use crate::error::Result;
use crate::llm::Providers;
use crate::notify::{CallOutcome, Notifier};
use crate::recording::{RecordingJob, RecordingPipeline};
use crate::scheduling::{CallClassification, SchedulingService};
use crate::store::{Profile, RecordStore, TranscriptTurn};

/// One finished call.
#[derive(Debug, Clone)]
pub struct PostCallJob {
    pub profile: Profile,
    pub call_sid: String,
    pub conversation_id: String,
    pub engine_conversation_id: String,
    pub classification: CallClassification,
}

impl PostCallJob {
    fn recording_job(&self) -> RecordingJob {
        RecordingJob {
            call_sid: self.call_sid.clone(),
            conversation_id: self.conversation_id.clone(),
            engine_conversation_id: self.engine_conversation_id.clone(),
        }
    }

    /// Coach calls and discovery calls are analyzed; assistant calls only
    /// feed scheduling.
    pub fn is_analyzed(&self) -> bool {
        self.classification.is_scheduled || self.classification.is_discovery()
    }
}

/// What the pipeline did, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostCallReport {
    pub transcript_turns: usize,
    /// `None` when analysis was skipped.
    pub ended_normally: Option<bool>,
    pub entities_stored: usize,
    pub summaries_stored: bool,
    pub action_items_stored: usize,
    pub follow_up_sent: bool,
    pub scheduled: bool,
}

/// Runs the post-call steps in order.
pub struct PostCallPipeline {
    providers: Providers,
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    recordings: Arc<RecordingPipeline>,
    scheduling: Arc<SchedulingService>,
    message_gap: Duration,
}

impl PostCallPipeline {
    pub fn new(
        providers: Providers,
        store: Arc<dyn RecordStore>,
        notifier: Arc<Notifier>,
        recordings: Arc<RecordingPipeline>,
        scheduling: Arc<SchedulingService>,
        message_gap: Duration,
    ) -> Self {
        Self {
            providers,
            store,
            notifier,
            recordings,
            scheduling,
            message_gap,
        }
    }

    /// Fetch the transcript, then analyze. A missing transcript is a
    /// terminal failure and nothing is analyzed.
    pub async fn run(&self, job: &PostCallJob) -> Result<PostCallReport> {
        tracing::info!(
            conversation_id = %job.conversation_id,
            engine_conversation_id = %job.engine_conversation_id,
            "post-call processing started"
        );
        let turns = self
            .recordings
            .transcript_with_retry(&job.recording_job())
            .await?;
        let report = self.analyze(job, &turns).await;
        tracing::info!(conversation_id = %job.conversation_id, ?report, "post-call processing finished");
        Ok(report)
    }

    /// The analysis steps for an already fetched transcript.
    pub async fn analyze(&self, job: &PostCallJob, turns: &[TranscriptTurn]) -> PostCallReport {
        let mut report = PostCallReport {
            transcript_turns: turns.len(),
            ..PostCallReport::default()
        };
        let profile = &job.profile;
        let coach = self.notifier.persona().coach_name.clone();

        if job.is_analyzed() {
            let normal = classify_ending(&self.providers, turns, &coach).await;
            report.ended_normally = Some(normal);
            if !normal
                && let Err(e) = self
                    .notifier
                    .notify_call_outcome(CallOutcome::Dropped, &profile.phone, Some(&profile.id))
                    .await
            {
                tracing::warn!(profile_id = %profile.id, error = %e, "wellbeing sms failed");
            }

            report.entities_stored = self.store_entities(job, turns, &coach).await;
            report.summaries_stored = self.store_summaries(job, turns, &coach).await;

            let action_items = extract_action_items(&self.providers, turns, &coach).await;
            if !action_items.is_empty() {
                match self
                    .store
                    .insert_action_items(&profile.id, &job.conversation_id, &action_items)
                    .await
                {
                    Ok(n) => report.action_items_stored = n,
                    Err(e) => tracing::warn!(error = %e, "storing action items failed"),
                }
            }

            if normal {
                report.follow_up_sent = self.send_follow_up(job, turns, &action_items, &coach).await;
            } else {
                tracing::info!("call ended abruptly, skipping follow-up message");
            }
        } else {
            tracing::info!(
                conversation_id = %job.conversation_id,
                "assistant call, skipping analysis"
            );
        }

        match self
            .scheduling
            .handle_scheduling(profile, turns, job.classification.is_scheduled, Utc::now())
            .await
        {
            Ok(call) => report.scheduled = call.is_some(),
            Err(e) => tracing::warn!(profile_id = %profile.id, error = %e, "post-call scheduling failed"),
        }
        report
    }

    async fn store_entities(&self, job: &PostCallJob, turns: &[TranscriptTurn], coach: &str) -> usize {
        let previous: Vec<String> = match self.store.list_entities(&job.profile.id).await {
            Ok(notes) => notes.into_iter().map(|n| n.content).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "loading known entities failed");
                Vec::new()
            }
        };
        let facts = extract_entities(&self.providers, turns, &previous, coach).await;
        if facts.is_empty() {
            tracing::info!("call had no new key information");
            return 0;
        }
        match self
            .store
            .insert_entities(&job.profile.id, &job.conversation_id, &facts)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "storing entities failed");
                0
            }
        }
    }

    async fn store_summaries(&self, job: &PostCallJob, turns: &[TranscriptTurn], coach: &str) -> bool {
        let Some(pair) = generate_summaries(&self.providers, turns, coach).await else {
            return false;
        };
        match self
            .store
            .insert_summary_pair(&job.profile.id, &job.conversation_id, &pair.short, &pair.detailed)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "storing summaries failed");
                false
            }
        }
    }

    async fn send_follow_up(
        &self,
        job: &PostCallJob,
        turns: &[TranscriptTurn],
        action_items: &[String],
        coach: &str,
    ) -> bool {
        let Some((first, second)) =
            create_post_call_message(&self.providers, turns, action_items, coach).await
        else {
            return false;
        };
        let profile = &job.profile;
        if let Err(e) = self
            .notifier
            .send_sms(&profile.phone, &first, Some(&profile.id))
            .await
        {
            tracing::warn!(error = %e, "follow-up part one failed");
            return false;
        }
        tokio::time::sleep(self.message_gap).await;
        if let Err(e) = self
            .notifier
            .send_sms(&profile.phone, &second, Some(&profile.id))
            .await
        {
            tracing::warn!(error = %e, "follow-up part two failed");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for PostCallPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCallPipeline")
            .field("providers", &self.providers)
            .field("message_gap", &self.message_gap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::blob::LocalBlobStore;
    use crate::config::{PersonaConfig, PipelineConfig, SchedulingConfig};
    use crate::llm::GenerationRequest;
    use crate::notify::messages::WELLBEING_MESSAGES;
    use crate::scheduling::SchedulingExtractor;
    use crate::store::{SqliteRecordStore, SummaryKind};
    use crate::test_utils::{
        FakeMailer, FakeTelephony, FakeTranscripts, ScriptedProvider, providers,
        store_with_profile, transcript,
    };

    struct Harness {
        pipeline: PostCallPipeline,
        store: Arc<SqliteRecordStore>,
        telephony: Arc<FakeTelephony>,
        profile: Profile,
        _dir: tempfile::TempDir,
    }

    /// Anthropic answers by recognizing the system prompt; OpenAI (the
    /// structured primary) answers scheduling.
    fn anthropic(ending: &'static str) -> Arc<ScriptedProvider> {
        ScriptedProvider::new("anthropic", move |req: &GenerationRequest| {
            let text = if req.system.contains("ONLY 'YES' or 'NO'") {
                ending
            } else if req.system.contains("key information") {
                "Ada leads a team of 12."
            } else if req.system.contains("brief notes") {
                "Delegation."
            } else if req.system.contains("detailed, insightful") {
                "Ada wants to delegate more."
            } else if req.system.contains("action items") {
                "Email Bob"
            } else if req.system.contains("follow-up messages") {
                "Great call!===Keep going."
            } else {
                "{\"scheduled\": false, \"reason\": \"none\"}"
            };
            Ok(text.to_owned())
        })
    }

    async fn harness(ending: &'static str) -> Harness {
        let (store, profile) = store_with_profile(Some("ada@example.com")).await;
        let telephony = Arc::new(FakeTelephony::default());
        let dir = tempfile::tempdir().unwrap();
        let p = providers(
            anthropic(ending),
            ScriptedProvider::always("openai", r#"{"scheduled": false, "reason": "none"}"#),
        );
        let notifier = Arc::new(Notifier::new(
            telephony.clone(),
            store.clone(),
            Arc::new(FakeMailer::default()),
            PersonaConfig::default(),
            "team@meetmaximo.com",
        ));
        let recordings = Arc::new(RecordingPipeline::new(
            telephony.clone(),
            Arc::new(LocalBlobStore::new(dir.path().to_path_buf(), "http://x/blobs", "s")),
            Arc::new(FakeTranscripts::default()),
            store.clone(),
            &PipelineConfig::default(),
        ));
        let scheduling = Arc::new(SchedulingService::new(
            store.clone(),
            notifier.clone(),
            SchedulingExtractor::new(p.clone(), PersonaConfig::default(), &SchedulingConfig::default()),
            Duration::ZERO,
        ));
        Harness {
            pipeline: PostCallPipeline::new(
                p,
                store.clone(),
                notifier,
                recordings,
                scheduling,
                Duration::ZERO,
            ),
            store,
            telephony,
            profile,
            _dir: dir,
        }
    }

    fn job(profile: &Profile, is_scheduled: bool, max_call_number: usize) -> PostCallJob {
        PostCallJob {
            profile: profile.clone(),
            call_sid: "CA1".into(),
            conversation_id: "conv-1".into(),
            engine_conversation_id: "el-1".into(),
            classification: CallClassification {
                is_scheduled,
                max_call_number,
            },
        }
    }

    fn call() -> Vec<TranscriptTurn> {
        transcript(&["Hi Ada", "Hi Max", "What's next?", "I'll email Bob. Bye!"])
    }

    #[tokio::test]
    async fn normal_scheduled_call_runs_every_step() {
        let h = harness("YES").await;
        let report = h.pipeline.analyze(&job(&h.profile, true, 3), &call()).await;

        assert_eq!(report.ended_normally, Some(true));
        assert_eq!(report.entities_stored, 1);
        assert!(report.summaries_stored);
        assert_eq!(report.action_items_stored, 1);
        assert!(report.follow_up_sent);
        assert!(!report.scheduled);
        assert_eq!(h.telephony.sms_bodies(), vec!["Great call!", "Keep going."]);
        assert_eq!(
            h.store.list_summaries(SummaryKind::Detailed, &h.profile.id).await.unwrap()[0].content,
            "Ada wants to delegate more."
        );
    }

    #[tokio::test]
    async fn dropped_call_gets_wellbeing_text_and_no_follow_up() {
        let h = harness("NO").await;
        let report = h.pipeline.analyze(&job(&h.profile, true, 3), &call()).await;

        assert_eq!(report.ended_normally, Some(false));
        assert!(!report.follow_up_sent);
        let bodies = h.telephony.sms_bodies();
        assert_eq!(bodies.len(), 1);
        assert!(WELLBEING_MESSAGES.contains(&bodies[0].as_str()));
    }

    #[tokio::test]
    async fn assistant_calls_skip_analysis() {
        let h = harness("YES").await;
        let report = h.pipeline.analyze(&job(&h.profile, false, 2), &call()).await;
        assert_eq!(report.ended_normally, None);
        assert_eq!(report.entities_stored, 0);
        assert!(h.telephony.sent_sms().is_empty());
    }

    #[tokio::test]
    async fn discovery_calls_are_analyzed_even_unscheduled() {
        let h = harness("YES").await;
        let report = h.pipeline.analyze(&job(&h.profile, false, 0), &call()).await;
        assert_eq!(report.ended_normally, Some(true));
    }
}
