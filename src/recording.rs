//! Post-call recording archive and transcript retrieval.
//!
//! After a call ends the provider needs a few seconds to finalize the
//! recording. The pipeline then downloads it, archives it in blob storage,
//! links it from the conversation and pulls the engine transcript. The
//! provider copy is deleted only once a non-empty transcript is stored, so a
//! retried run can still find it.

use std::sync::Arc;
use std::time::Duration;

use crate::blob::BlobStore;
use crate::config::PipelineConfig;
use crate::error::{CoachError, Result};
use crate::retry::{RetryPolicy, retry_async};
use crate::store::{RecordStore, TranscriptTurn};
use crate::telephony::Telephony;
use crate::voice::TranscriptSource;

/// Bucket recordings are archived in.
pub const RECORDING_BUCKET: &str = "call-recordings";

/// Identifiers of the call being processed.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub call_sid: String,
    pub conversation_id: String,
    pub engine_conversation_id: String,
}

/// Download, archive and transcribe finished calls.
pub struct RecordingPipeline {
    telephony: Arc<dyn Telephony>,
    blobs: Arc<dyn BlobStore>,
    transcripts: Arc<dyn TranscriptSource>,
    store: Arc<dyn RecordStore>,
    settle: Duration,
    download_policy: RetryPolicy,
    transcript_policy: RetryPolicy,
    signed_url_ttl: Duration,
}

impl RecordingPipeline {
    pub fn new(
        telephony: Arc<dyn Telephony>,
        blobs: Arc<dyn BlobStore>,
        transcripts: Arc<dyn TranscriptSource>,
        store: Arc<dyn RecordStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            telephony,
            blobs,
            transcripts,
            store,
            settle: Duration::from_secs(config.recording_settle_secs),
            download_policy: RetryPolicy::fixed(
                config.download_attempts,
                Duration::from_secs(config.download_backoff_secs),
            ),
            transcript_policy: RetryPolicy::fixed(
                config.transcript_attempts,
                Duration::from_millis(config.transcript_retry_ms),
            ),
            signed_url_ttl: Duration::from_secs(config.signed_url_ttl_secs),
        }
    }

    /// One pass: archive the recording and fetch the transcript.
    ///
    /// `None` when there is no recording, the download budget is exhausted,
    /// archiving fails, or the transcript cannot be fetched.
    pub async fn process_recording(&self, job: &RecordingJob) -> Option<Vec<TranscriptTurn>> {
        tokio::time::sleep(self.settle).await;

        let recordings = match self.telephony.list_recordings(&job.call_sid).await {
            Ok(recordings) => recordings,
            Err(e) => {
                tracing::warn!(call_sid = %job.call_sid, error = %e, "listing recordings failed");
                return None;
            }
        };
        let Some(recording) = recordings.into_iter().next() else {
            tracing::warn!(call_sid = %job.call_sid, "no recording found for call");
            return None;
        };

        let audio = retry_async(&self.download_policy, "recording download", |_| {
            self.telephony.download_recording(&recording.sid)
        })
        .await
        .ok()?;
        tracing::info!(call_sid = %job.call_sid, bytes = audio.len(), "recording downloaded");

        if let Err(e) = self.archive(job, &audio).await {
            tracing::error!(call_sid = %job.call_sid, error = %e, "archiving recording failed");
            return None;
        }

        let turns = match self
            .transcripts
            .fetch_transcript(&job.engine_conversation_id)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(
                    engine_conversation_id = %job.engine_conversation_id,
                    error = %e,
                    "transcript fetch failed"
                );
                return None;
            }
        };
        if turns.is_empty() {
            tracing::info!(conversation_id = %job.conversation_id, "transcript not ready yet");
            return Some(turns);
        }

        if let Err(e) = self
            .store
            .set_transcription(&job.conversation_id, &turns)
            .await
        {
            tracing::error!(conversation_id = %job.conversation_id, error = %e, "storing transcript failed");
            return None;
        }
        if let Err(e) = self.telephony.delete_recording(&recording.sid).await {
            tracing::warn!(recording_sid = %recording.sid, error = %e, "provider recording not deleted");
        }
        tracing::info!(
            conversation_id = %job.conversation_id,
            turns = turns.len(),
            "recording processed"
        );
        Some(turns)
    }

    async fn archive(&self, job: &RecordingJob, audio: &[u8]) -> Result<String> {
        let name = format!("{}.wav", job.call_sid);
        self.blobs
            .upload(RECORDING_BUCKET, &name, audio, "audio/wav")
            .await?;
        let url = self
            .blobs
            .signed_url(RECORDING_BUCKET, &name, self.signed_url_ttl)
            .await?;
        self.store
            .set_call_recording(&job.conversation_id, &url)
            .await?;
        Ok(url)
    }

    /// Repeat [`Self::process_recording`] until a non-empty transcript comes
    /// back or the attempt budget runs out.
    pub async fn transcript_with_retry(&self, job: &RecordingJob) -> Result<Vec<TranscriptTurn>> {
        let attempts = self.transcript_policy.max_attempts;
        for attempt in 1..=attempts {
            if let Some(turns) = self.process_recording(job).await
                && !turns.is_empty()
            {
                return Ok(turns);
            }
            if attempt < attempts {
                tracing::info!(
                    conversation_id = %job.conversation_id,
                    attempt,
                    "transcript unavailable, retrying"
                );
                tokio::time::sleep(self.transcript_policy.delay_for_attempt(attempt)).await;
            }
        }
        Err(CoachError::Pipeline(format!(
            "no transcript for conversation {} after {attempts} attempts",
            job.conversation_id
        )))
    }
}

impl std::fmt::Debug for RecordingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingPipeline")
            .field("settle", &self.settle)
            .field("download_policy", &self.download_policy)
            .field("transcript_policy", &self.transcript_policy)
            .finish_non_exhaustive()
    }
}
