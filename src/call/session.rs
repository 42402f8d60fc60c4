//! Async runner for one call: feeds the machine and executes its actions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;

use super::machine::{CallAction, CallInput, CallMachine, CallSettings, FollowUp, SetupOutcome, TeardownPlan};
use super::registry::{CallControl, LiveCalls, PendingCall, PendingCalls};
use super::timers::{CallTimers, TimerKey};
use crate::analysis::{PostCallJob, PostCallPipeline};
use crate::notify::{CallOutcome, Notifier};
use crate::prompt::ProfileContext;
use crate::prompt::assistant::{
    assistant_greeting, unauthorized_greeting, unauthorized_prompt, unscheduled_prompt,
};
use crate::prompt::coach::{coach_greeting, coach_prompt};
use crate::scheduling::lookup_call_type;
use crate::scheduling::timezone::{local_now, parse_timezone};
use crate::store::{ConversationType, NewConversation, Profile, RecordStore};
use crate::telephony::{StreamEvent, Telephony};
use crate::voice::{EngineCommand, EngineEvent, EngineSession, VoiceEngine};

/// Voice-engine agents for the two personas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIds {
    pub coach: String,
    pub assistant: String,
}

/// Collaborators shared by every call session.
pub struct CallServices {
    pub store: Arc<dyn RecordStore>,
    pub telephony: Arc<dyn Telephony>,
    pub engine: Arc<dyn VoiceEngine>,
    pub notifier: Arc<Notifier>,
    pub post_call: Arc<PostCallPipeline>,
    pub pending: Arc<PendingCalls>,
    pub live: Arc<LiveCalls>,
    pub agents: AgentIds,
    pub settings: CallSettings,
    /// Absolute URL of the recording status callback.
    pub recording_callback: String,
}

impl std::fmt::Debug for CallServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallServices")
            .field("agents", &self.agents)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

enum Step {
    Continue,
    Feed(CallInput),
    Finished(Box<TeardownPlan>),
}

/// One call, from the media stream `start` to teardown.
pub struct CallSession {
    services: Arc<CallServices>,
    machine: CallMachine,
    timers: CallTimers,
    timer_rx: mpsc::Receiver<CallInput>,
    control_tx: mpsc::Sender<CallControl>,
    control_rx: mpsc::Receiver<CallControl>,
    engine: Option<EngineSession>,
    outbound: mpsc::Sender<String>,
}

impl CallSession {
    /// `outbound` carries JSON frames for the telephony media stream.
    pub fn new(services: Arc<CallServices>, outbound: mpsc::Sender<String>) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(32);
        let (control_tx, control_rx) = mpsc::channel(8);
        Self {
            machine: CallMachine::new(services.settings.clone()),
            services,
            timers: CallTimers::new(timer_tx),
            timer_rx,
            control_tx,
            control_rx,
            engine: None,
            outbound,
        }
    }

    /// Drive the call until teardown or until the stream closes. `inbound`
    /// yields raw text frames from the media stream.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) -> Option<TeardownPlan> {
        loop {
            // Control signals first: a voicemail flag must land before a
            // queued `stop` is handled.
            let input = tokio::select! {
                biased;
                Some(signal) = self.control_rx.recv() => match signal {
                    CallControl::Voicemail => CallInput::Voicemail,
                    CallControl::HangUp => CallInput::HangUp,
                },
                Some(input) = self.timer_rx.recv() => input,
                frame = inbound.recv() => match frame {
                    Some(raw) => match StreamEvent::parse(&raw) {
                        Ok(event) => CallInput::Stream(event),
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed media-stream frame dropped");
                            continue;
                        }
                    },
                    None => CallInput::SocketClosed,
                },
                event = next_engine_event(&mut self.engine) => match event {
                    Some(event) => {
                        log_engine_event(&event);
                        CallInput::Engine(event)
                    }
                    None => {
                        tracing::info!("voice engine session closed");
                        self.engine = None;
                        CallInput::EngineClosed
                    }
                },
            };
            let socket_closed = matches!(input, CallInput::SocketClosed);

            if let Some(plan) = self.dispatch(input).await {
                return Some(plan);
            }
            if socket_closed {
                tracing::debug!("media stream closed before the call started");
                self.timers.cancel_all();
                return None;
            }
        }
    }

    async fn dispatch(&mut self, input: CallInput) -> Option<TeardownPlan> {
        let mut inputs = VecDeque::from([input]);
        while let Some(input) = inputs.pop_front() {
            for action in self.machine.handle(input, Instant::now()) {
                match self.execute(action).await {
                    Step::Continue => {}
                    Step::Feed(next) => inputs.push_back(next),
                    Step::Finished(plan) => return Some(*plan),
                }
            }
        }
        None
    }

    async fn execute(&mut self, action: CallAction) -> Step {
        match action {
            CallAction::BeginSetup {
                stream_sid,
                call_sid,
            } => {
                tracing::info!(stream_sid = %stream_sid, call_sid = %call_sid, "call started");
                let outcome = self.setup(&call_sid).await;
                return Step::Feed(CallInput::SetupFinished(Box::new(outcome)));
            }
            CallAction::ToEngine(command) => {
                if let Some(engine) = &self.engine
                    && let Err(e) = engine.send(command).await
                {
                    tracing::warn!(error = %e, "voice engine send failed");
                }
            }
            CallAction::ToStream(command) => {
                if self.outbound.send(command.to_json()).await.is_err() {
                    tracing::debug!("media stream gone, frame dropped");
                }
            }
            CallAction::StartWindowTimer { generation, after } => {
                tracing::debug!(generation, ?after, "non-interruptible window opened");
                self.timers.schedule(
                    TimerKey::Window,
                    after,
                    CallInput::WindowExpired { generation },
                );
            }
            CallAction::ScheduleRefresh { index, after } => {
                self.timers.schedule(
                    TimerKey::PromptRefresh(index),
                    after,
                    CallInput::PromptRefreshDue,
                );
            }
            CallAction::RefreshPrompt => self.refresh_prompt().await,
            CallAction::RegisterEngineConversation(id) => {
                tracing::info!(engine_conversation_id = %id, "voice engine conversation started");
                if let Some(call_sid) = &self.machine.state().call_sid {
                    self.services.live.set_engine_conversation(call_sid, &id);
                }
            }
            CallAction::CloseEngine => {
                if let Some(engine) = self.engine.take() {
                    engine.close();
                }
            }
            CallAction::Teardown(plan) => {
                self.teardown(&plan).await;
                return Step::Finished(plan);
            }
        }
        Step::Continue
    }

    /// Resolve the caller, classify the call, create the conversation and
    /// open the engine session.
    async fn setup(&mut self, call_sid: &str) -> SetupOutcome {
        let services = Arc::clone(&self.services);
        let now = Utc::now();

        // Live before the first await so control signals sent during setup
        // queue up instead of being dropped. Teardown removes the entry.
        let pending = services.pending.take(call_sid);
        let phone = pending.as_ref().map(|p| p.phone.clone());
        services
            .live
            .insert(call_sid, phone.clone(), self.control_tx.clone());

        if let Err(e) = services
            .telephony
            .start_recording(call_sid, &services.recording_callback)
            .await
        {
            tracing::warn!(call_sid, error = %e, "could not start call recording");
        }

        let profile = self.resolve_profile(pending).await;

        let mut outcome = SetupOutcome {
            phone: phone.clone(),
            profile: profile.clone(),
            conversation_id: None,
            classification: Default::default(),
            call_started: now,
            engine_connected: false,
        };
        let persona = services.notifier.persona();

        let (agent_id, prompt, first_message, user_name) = match &profile {
            Some(profile) => {
                let today = local_now(parse_timezone(&profile.timezone), now);
                let classification =
                    match lookup_call_type(services.store.as_ref(), &profile.id, today.date_naive())
                        .await
                    {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::error!(profile_id = %profile.id, error = %e, "call classification failed");
                            return outcome;
                        }
                    };
                outcome.classification = classification;
                tracing::info!(
                    profile_id = %profile.id,
                    is_scheduled = classification.is_scheduled,
                    max_call_number = classification.max_call_number,
                    "classified call"
                );

                let kind = if classification.is_scheduled {
                    ConversationType::ScheduledCoach
                } else {
                    ConversationType::Assistant
                };
                match services
                    .store
                    .create_conversation(&NewConversation {
                        profile_id: profile.id.clone(),
                        date: today.date_naive(),
                        time: today.format("%H:%M:%S").to_string(),
                        kind,
                    })
                    .await
                {
                    Ok(conversation) => outcome.conversation_id = Some(conversation.id),
                    Err(e) => {
                        tracing::error!(profile_id = %profile.id, error = %e, "conversation not created");
                    }
                }

                let ctx = load_context(services.store.as_ref(), profile, now).await;
                if classification.is_scheduled {
                    (
                        services.agents.coach.clone(),
                        coach_prompt(&ctx, persona, classification.max_call_number, Duration::ZERO, now)
                            .build(),
                        coach_greeting(&profile.first_name, persona),
                        profile.first_name.clone(),
                    )
                } else {
                    (
                        services.agents.assistant.clone(),
                        unscheduled_prompt(&ctx, persona, now).build(),
                        assistant_greeting(Some(&profile.first_name), persona),
                        profile.first_name.clone(),
                    )
                }
            }
            None => {
                tracing::info!(call_sid, phone = ?phone, "caller has no profile");
                (
                    services.agents.assistant.clone(),
                    unauthorized_prompt(persona).build(),
                    unauthorized_greeting(persona),
                    String::new(),
                )
            }
        };

        let session = match services.engine.connect(&agent_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(call_sid, error = %e, "voice engine connect failed");
                return outcome;
            }
        };
        let initiate = EngineCommand::Initiate {
            prompt,
            first_message,
            user_name,
        };
        if let Err(e) = session.send(initiate).await {
            tracing::error!(call_sid, error = %e, "voice engine initiation failed");
            return outcome;
        }
        self.engine = Some(session);
        outcome.engine_connected = true;
        outcome
    }

    /// The profile captured by the webhook, or a fresh lookup by phone.
    async fn resolve_profile(&self, pending: Option<PendingCall>) -> Option<Profile> {
        let pending = match pending {
            Some(pending) => pending,
            None => {
                tracing::warn!("no pending call registered for stream");
                return None;
            }
        };
        if pending.profile.is_some() {
            return pending.profile;
        }
        match self.services.store.find_profile_by_phone(&pending.phone).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(phone = %pending.phone, error = %e, "profile lookup failed");
                None
            }
        }
    }

    async fn refresh_prompt(&self) {
        let state = self.machine.state();
        let (Some(profile), Some(started)) = (&state.profile, state.call_started) else {
            return;
        };
        let Some(engine) = &self.engine else {
            return;
        };
        let now = Utc::now();
        let elapsed = (now - started).to_std().unwrap_or_default();
        let ctx = load_context(self.services.store.as_ref(), profile, now).await;
        let prompt = coach_prompt(
            &ctx,
            self.services.notifier.persona(),
            state.classification.max_call_number,
            elapsed,
            now,
        )
        .build();
        match engine.send(EngineCommand::UpdatePrompt(prompt)).await {
            Ok(()) => tracing::info!(elapsed_secs = elapsed.as_secs(), "system prompt refreshed"),
            Err(e) => tracing::warn!(error = %e, "system prompt refresh failed"),
        }
    }

    /// The stored conversation carries the voicemail flag even when the
    /// live signal never reached this session.
    async fn flagged_as_voicemail(&self, plan: &TeardownPlan) -> bool {
        let Some(conversation_id) = &plan.conversation_id else {
            return false;
        };
        match self.services.store.get_conversation(conversation_id).await {
            Ok(conversation) => conversation.is_some_and(|c| c.voicemail),
            Err(e) => {
                tracing::warn!(%conversation_id, error = %e, "voicemail flag unreadable");
                false
            }
        }
    }

    async fn teardown(&mut self, plan: &TeardownPlan) {
        self.timers.cancel_all();
        if let Some(engine) = self.engine.take() {
            engine.close();
        }
        if let Some(call_sid) = &plan.call_sid {
            self.services.pending.remove(call_sid);
            self.services.live.remove(call_sid);
        }
        let mut follow_up = plan.follow_up();
        if follow_up == FollowUp::PostCall && self.flagged_as_voicemail(plan).await {
            follow_up = FollowUp::VoicemailSms;
        }
        tracing::info!(
            call_sid = ?plan.call_sid,
            conversation_id = ?plan.conversation_id,
            voicemail = plan.voicemail,
            ?follow_up,
            "call ended"
        );

        let notifier = &self.services.notifier;
        match follow_up {
            FollowUp::PostCall => {
                let (Some(profile), Some(call_sid), Some(conversation_id), Some(engine_id)) = (
                    plan.profile.clone(),
                    plan.call_sid.clone(),
                    plan.conversation_id.clone(),
                    plan.engine_conversation_id.clone(),
                ) else {
                    return;
                };
                let job = PostCallJob {
                    profile,
                    call_sid,
                    conversation_id,
                    engine_conversation_id: engine_id,
                    classification: plan.classification,
                };
                let pipeline = Arc::clone(&self.services.post_call);
                tokio::spawn(async move {
                    if let Err(e) = pipeline.run(&job).await {
                        tracing::error!(conversation_id = %job.conversation_id, error = %e, "post-call processing failed");
                    }
                });
            }
            FollowUp::VoicemailSms => {
                if let Some(profile) = &plan.profile
                    && let Err(e) = notifier
                        .notify_call_outcome(CallOutcome::Voicemail, &profile.phone, Some(&profile.id))
                        .await
                {
                    tracing::warn!(profile_id = %profile.id, error = %e, "voicemail follow-up failed");
                }
            }
            FollowUp::SignupSms => {
                if let Some(phone) = &plan.phone
                    && let Err(e) = notifier
                        .notify_call_outcome(CallOutcome::Unauthorized, phone, None)
                        .await
                {
                    tracing::warn!(error = %e, "signup link not sent");
                }
            }
            FollowUp::Nothing => {}
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("state", self.machine.state())
            .finish_non_exhaustive()
    }
}

async fn next_engine_event(engine: &mut Option<EngineSession>) -> Option<EngineEvent> {
    match engine {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

async fn load_context(
    store: &dyn RecordStore,
    profile: &Profile,
    now: chrono::DateTime<Utc>,
) -> ProfileContext {
    match ProfileContext::load(store, profile, now).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(profile_id = %profile.id, error = %e, "profile history unavailable");
            ProfileContext::empty(profile.clone())
        }
    }
}

fn log_engine_event(event: &EngineEvent) {
    match event {
        EngineEvent::UserTranscript(text) => tracing::info!(transcript = %text, "user said"),
        EngineEvent::AgentResponse(text) => tracing::info!(response = %text, "agent responded"),
        EngineEvent::Error(message) => tracing::warn!(message = %message, "voice engine error"),
        EngineEvent::Interruption => tracing::debug!("caller interrupted"),
        EngineEvent::Ignored(kind) => tracing::trace!(kind = %kind, "engine event ignored"),
        EngineEvent::InitiationMetadata { .. } | EngineEvent::Audio(_) | EngineEvent::Ping { .. } => {}
    }
}
