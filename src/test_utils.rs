//! Shared test doubles for the collaborator traits.
//!
//! Stub providers, an in-memory telephony recorder, a capturing mailer and
//! a scripted transcript source, plus helpers that seed an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::llm::{GenerationRequest, ProviderError, Providers, TextProvider};
use crate::notify::{Email, Mailer, NotifyError};
use crate::store::{NewProfile, Profile, RecordStore, SqliteRecordStore, TranscriptTurn, Speaker};
use crate::telephony::{OutboundCallRequest, RecordingInfo, Telephony, TelephonyError};
use crate::voice::{
    EngineCommand, EngineEvent, EngineSession, TranscriptSource, VoiceEngine, VoiceError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Responder = dyn Fn(&GenerationRequest) -> Result<String, ProviderError> + Send + Sync;

/// Provider whose answers come from a closure. Every request is recorded.
pub struct ScriptedProvider {
    name: String,
    respond: Box<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(
        name: &str,
        respond: impl Fn(&GenerationRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answers `text`.
    pub fn always(name: &str, text: &str) -> Arc<Self> {
        let text = text.to_owned();
        Self::new(name, move |_| Ok(text.clone()))
    }

    /// Always fails with an upstream error.
    pub fn failing(name: &str) -> Arc<Self> {
        let label = name.to_owned();
        Self::new(name, move |_| Err(ProviderError::Upstream(format!("{label} is down"))))
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl TextProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.respond)(request)
    }
}

/// Both orderings backed by the given pair.
pub fn providers(anthropic: Arc<ScriptedProvider>, openai: Arc<ScriptedProvider>) -> Providers {
    Providers::from_pair(anthropic, openai)
}

/// Records every telephony side effect instead of performing it.
#[derive(Default)]
pub struct FakeTelephony {
    sms: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<OutboundCallRequest>>,
    completed: Mutex<Vec<String>>,
    recordings_started: Mutex<Vec<String>>,
    recordings: Mutex<HashMap<String, Vec<(String, Bytes)>>>,
    deleted: Mutex<Vec<String>>,
    download_failures: AtomicU32,
    fail_calls: std::sync::atomic::AtomicBool,
    fail_sms: std::sync::atomic::AtomicBool,
}

impl FakeTelephony {
    pub fn sent_sms(&self) -> Vec<(String, String)> {
        self.sms.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sms_bodies(&self) -> Vec<String> {
        self.sent_sms().into_iter().map(|(_, body)| body).collect()
    }

    pub fn placed_calls(&self) -> Vec<OutboundCallRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn completed_calls(&self) -> Vec<String> {
        self.completed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn recordings_started(&self) -> Vec<String> {
        self.recordings_started
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn deleted_recordings(&self) -> Vec<String> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Attach a downloadable recording to `call_sid`.
    pub fn add_recording(&self, call_sid: &str, recording_sid: &str, audio: &'static [u8]) {
        if let Ok(mut recordings) = self.recordings.lock() {
            recordings
                .entry(call_sid.to_owned())
                .or_default()
                .push((recording_sid.to_owned(), Bytes::from_static(audio)));
        }
    }

    /// Fail the next `n` downloads with a 404.
    pub fn fail_downloads(&self, n: u32) {
        self.download_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_outbound_calls(&self) {
        self.fail_calls.store(true, Ordering::SeqCst);
    }

    pub fn fail_sms(&self) {
        self.fail_sms.store(true, Ordering::SeqCst);
    }
}

fn server_error() -> TelephonyError {
    TelephonyError::Status {
        status: 500,
        body: "fake failure".to_owned(),
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn place_outbound_call(
        &self,
        request: &OutboundCallRequest,
    ) -> Result<String, TelephonyError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        let mut calls = self.calls.lock().map_err(|_| server_error())?;
        calls.push(request.clone());
        Ok(format!("CA{}", calls.len()))
    }

    async fn complete_call(&self, call_sid: &str) -> Result<(), TelephonyError> {
        if let Ok(mut completed) = self.completed.lock() {
            completed.push(call_sid.to_owned());
        }
        Ok(())
    }

    async fn start_recording(
        &self,
        call_sid: &str,
        _callback_url: &str,
    ) -> Result<(), TelephonyError> {
        if let Ok(mut started) = self.recordings_started.lock() {
            started.push(call_sid.to_owned());
        }
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<String, TelephonyError> {
        if self.fail_sms.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        let mut sms = self.sms.lock().map_err(|_| server_error())?;
        sms.push((to.to_owned(), body.to_owned()));
        Ok(format!("SM{}", sms.len()))
    }

    async fn list_recordings(&self, call_sid: &str) -> Result<Vec<RecordingInfo>, TelephonyError> {
        let recordings = self.recordings.lock().map_err(|_| server_error())?;
        Ok(recordings
            .get(call_sid)
            .map(|list| {
                list.iter()
                    .map(|(sid, _)| RecordingInfo {
                        sid: sid.clone(),
                        call_sid: call_sid.to_owned(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download_recording(&self, recording_sid: &str) -> Result<Bytes, TelephonyError> {
        let pending = self.download_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.download_failures.store(pending - 1, Ordering::SeqCst);
            return Err(TelephonyError::Status {
                status: 404,
                body: "not ready".to_owned(),
            });
        }
        let recordings = self.recordings.lock().map_err(|_| server_error())?;
        recordings
            .values()
            .flatten()
            .find(|(sid, _)| sid == recording_sid)
            .map(|(_, audio)| audio.clone())
            .ok_or(TelephonyError::Status {
                status: 404,
                body: "unknown recording".to_owned(),
            })
    }

    async fn delete_recording(&self, recording_sid: &str) -> Result<(), TelephonyError> {
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(recording_sid.to_owned());
        }
        Ok(())
    }
}

/// Captures outgoing email.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<Email>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Mail("poisoned".to_owned()))?
            .push(email.clone());
        Ok(())
    }
}

/// Serves queued transcripts per engine conversation; an exhausted queue
/// yields an empty transcript.
#[derive(Default)]
pub struct FakeTranscripts {
    queued: Mutex<HashMap<String, VecDeque<Vec<TranscriptTurn>>>>,
    fetches: AtomicU32,
}

impl FakeTranscripts {
    pub fn push(&self, engine_conversation_id: &str, turns: Vec<TranscriptTurn>) {
        if let Ok(mut queued) = self.queued.lock() {
            queued
                .entry(engine_conversation_id.to_owned())
                .or_default()
                .push_back(turns);
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptSource for FakeTranscripts {
    async fn fetch_transcript(
        &self,
        engine_conversation_id: &str,
    ) -> Result<Vec<TranscriptTurn>, VoiceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut queued = self
            .queued
            .lock()
            .map_err(|_| VoiceError::Protocol("poisoned".to_owned()))?;
        Ok(queued
            .get_mut(engine_conversation_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }
}

/// The engine side of a [`FakeVoiceEngine`] session.
pub struct EngineEnd {
    pub agent_id: String,
    pub commands: mpsc::Receiver<EngineCommand>,
    pub events: mpsc::Sender<EngineEvent>,
    pub shutdown: CancellationToken,
}

/// Hands out channel-backed sessions; the test plays the engine.
#[derive(Default)]
pub struct FakeVoiceEngine {
    ends: Mutex<VecDeque<EngineEnd>>,
    refuse: std::sync::atomic::AtomicBool,
    connect_delay_ms: AtomicU64,
}

impl FakeVoiceEngine {
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Hold every `connect` for `ms` milliseconds.
    pub fn delay_connections(&self, ms: u64) {
        self.connect_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Wait (briefly) for the next session a caller opened.
    pub async fn next_session(&self) -> EngineEnd {
        for _ in 0..400 {
            if let Some(end) = self.ends.lock().ok().and_then(|mut e| e.pop_front()) {
                return end;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("no engine session was opened");
    }
}

#[async_trait]
impl VoiceEngine for FakeVoiceEngine {
    async fn connect(&self, agent_id: &str) -> Result<EngineSession, VoiceError> {
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(VoiceError::Connect("refused".to_owned()));
        }
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (evt_tx, evt_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        if let Ok(mut ends) = self.ends.lock() {
            ends.push_back(EngineEnd {
                agent_id: agent_id.to_owned(),
                commands: cmd_rx,
                events: evt_tx,
                shutdown: shutdown.clone(),
            });
        }
        Ok(EngineSession::from_channels(cmd_tx, evt_rx, shutdown))
    }
}

/// A transcript alternating user and coach turns.
pub fn transcript(lines: &[&str]) -> Vec<TranscriptTurn> {
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| TranscriptTurn {
            text: (*text).to_owned(),
            speaker: if i % 2 == 0 { Speaker::Coach } else { Speaker::User },
            timestamp: i as f64 * 5.0,
        })
        .collect()
}

/// In-memory store with one profile in New York time.
pub async fn store_with_profile(email: Option<&str>) -> (Arc<SqliteRecordStore>, Profile) {
    let store = Arc::new(SqliteRecordStore::open_in_memory().expect("open in-memory store"));
    let profile = store
        .insert_profile(
            &NewProfile {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: email.map(str::to_owned),
                phone: "+15555550100".into(),
                timezone: "America/New_York".into(),
            },
            Utc::now(),
        )
        .await
        .expect("insert profile");
    (store, profile)
}
