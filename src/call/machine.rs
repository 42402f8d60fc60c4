//! The call transition function: `(state, input) → actions`.
//!
//! [`CallMachine::handle`] never performs I/O. The session runner feeds it
//! telephony frames, engine events, timer expiries and control signals, and
//! executes whatever actions come back.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::state::{CallPhase, ConnectionState};
use crate::config::CallConfig;
use crate::scheduling::CallClassification;
use crate::store::Profile;
use crate::telephony::{StreamCommand, StreamEvent};
use crate::voice::{EngineCommand, EngineEvent};

/// Timing knobs for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSettings {
    pub non_interruptible: Duration,
    /// Delays after call start at which the coach prompt is regenerated.
    pub prompt_refresh: Vec<Duration>,
}

impl CallSettings {
    pub fn from_config(config: &CallConfig) -> Self {
        Self {
            non_interruptible: Duration::from_millis(config.non_interruptible_ms),
            prompt_refresh: config
                .prompt_refresh_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

/// Result of the asynchronous setup step.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub phone: Option<String>,
    pub profile: Option<Profile>,
    pub conversation_id: Option<String>,
    pub classification: CallClassification,
    pub call_started: DateTime<Utc>,
    /// `false` when the voice engine could not be reached.
    pub engine_connected: bool,
}

/// Everything that can happen to a call.
#[derive(Debug, Clone)]
pub enum CallInput {
    Stream(StreamEvent),
    Engine(EngineEvent),
    SetupFinished(Box<SetupOutcome>),
    WindowExpired { generation: u64 },
    PromptRefreshDue,
    /// Answering machine picked up.
    Voicemail,
    /// The agent asked to end the call.
    HangUp,
    EngineClosed,
    SocketClosed,
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CallAction {
    /// Resolve the caller, create the conversation and open the engine.
    BeginSetup { stream_sid: String, call_sid: String },
    ToEngine(EngineCommand),
    ToStream(StreamCommand),
    /// Schedule [`CallInput::WindowExpired`] after `after`, replacing any
    /// pending one.
    StartWindowTimer { generation: u64, after: Duration },
    /// Schedule the `index`th [`CallInput::PromptRefreshDue`].
    ScheduleRefresh { index: usize, after: Duration },
    /// Regenerate the coach prompt and push it to the engine.
    RefreshPrompt,
    /// Remember which engine conversation belongs to this call.
    RegisterEngineConversation(String),
    CloseEngine,
    Teardown(Box<TeardownPlan>),
}

/// What is left to do once a call is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Transcript, analysis and scheduling.
    PostCall,
    /// Answering machine: one "missed you" text.
    VoicemailSms,
    /// Caller has no profile: send the signup link.
    SignupSms,
    Nothing,
}

/// Snapshot of the call taken just before its state is reset.
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownPlan {
    pub call_sid: Option<String>,
    pub phone: Option<String>,
    pub profile: Option<Profile>,
    pub conversation_id: Option<String>,
    pub engine_conversation_id: Option<String>,
    pub classification: CallClassification,
    pub voicemail: bool,
}

impl TeardownPlan {
    pub fn follow_up(&self) -> FollowUp {
        match &self.profile {
            Some(_) if self.voicemail => FollowUp::VoicemailSms,
            Some(_) if self.conversation_id.is_some() && self.engine_conversation_id.is_some() => {
                FollowUp::PostCall
            }
            Some(_) => FollowUp::Nothing,
            None if self.phone.is_some() => FollowUp::SignupSms,
            None => FollowUp::Nothing,
        }
    }
}

/// Owns the [`ConnectionState`] of one call.
#[derive(Debug)]
pub struct CallMachine {
    state: ConnectionState,
    settings: CallSettings,
}

impl CallMachine {
    pub fn new(settings: CallSettings) -> Self {
        Self {
            state: ConnectionState::new(settings.non_interruptible),
            settings,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn handle(&mut self, input: CallInput, now: Instant) -> Vec<CallAction> {
        match input {
            CallInput::Stream(event) => self.on_stream(event),
            CallInput::Engine(event) => self.on_engine(event, now),
            CallInput::SetupFinished(outcome) => self.on_setup(*outcome),
            CallInput::WindowExpired { generation } => {
                if self.state.window.expire(generation) {
                    tracing::debug!(generation, "non-interruptible window closed");
                }
                Vec::new()
            }
            CallInput::PromptRefreshDue => {
                let s = &self.state;
                if s.phase == CallPhase::Streaming
                    && s.engine_connected
                    && s.classification.is_scheduled
                    && s.profile.is_some()
                {
                    vec![CallAction::RefreshPrompt]
                } else {
                    Vec::new()
                }
            }
            CallInput::Voicemail => {
                self.state.voicemail = true;
                Vec::new()
            }
            CallInput::HangUp => {
                if self.state.engine_connected {
                    self.state.engine_connected = false;
                    vec![CallAction::CloseEngine]
                } else {
                    Vec::new()
                }
            }
            CallInput::EngineClosed => {
                self.state.engine_connected = false;
                self.teardown()
            }
            CallInput::SocketClosed => self.teardown(),
        }
    }

    fn on_stream(&mut self, event: StreamEvent) -> Vec<CallAction> {
        match event {
            StreamEvent::Start { start } => {
                if !self.state.enter(CallPhase::Setup) {
                    return Vec::new();
                }
                self.state.stream_sid = Some(start.stream_sid.clone());
                self.state.call_sid = Some(start.call_sid.clone());
                vec![CallAction::BeginSetup {
                    stream_sid: start.stream_sid,
                    call_sid: start.call_sid,
                }]
            }
            StreamEvent::Media { media } => {
                self.state.latest_media_timestamp = media.timestamp.unwrap_or(0);
                let s = &self.state;
                if s.phase == CallPhase::Streaming && s.engine_connected && !s.window.is_active() {
                    vec![CallAction::ToEngine(EngineCommand::AudioChunk(media.payload))]
                } else {
                    Vec::new()
                }
            }
            StreamEvent::Mark { mark } => {
                self.state.mark_queue.push_back(mark.name);
                Vec::new()
            }
            StreamEvent::Stop {} => self.teardown(),
            StreamEvent::Connected {} | StreamEvent::Unknown => Vec::new(),
        }
    }

    fn on_setup(&mut self, outcome: SetupOutcome) -> Vec<CallAction> {
        if self.state.phase != CallPhase::Setup {
            return Vec::new();
        }
        let s = &mut self.state;
        s.phone = outcome.phone;
        s.profile = outcome.profile;
        s.conversation_id = outcome.conversation_id;
        s.classification = outcome.classification;
        s.call_started = Some(outcome.call_started);
        s.engine_connected = outcome.engine_connected;

        if !outcome.engine_connected {
            return self.teardown();
        }
        self.state.enter(CallPhase::Streaming);

        if self.state.classification.is_scheduled && self.state.profile.is_some() {
            self.settings
                .prompt_refresh
                .iter()
                .enumerate()
                .map(|(index, after)| CallAction::ScheduleRefresh {
                    index,
                    after: *after,
                })
                .collect()
        } else {
            Vec::new()
        }
    }

    fn on_engine(&mut self, event: EngineEvent, now: Instant) -> Vec<CallAction> {
        if self.state.phase != CallPhase::Streaming {
            return Vec::new();
        }
        match event {
            EngineEvent::InitiationMetadata { conversation_id } => {
                self.state.engine_conversation_id = Some(conversation_id.clone());
                vec![CallAction::RegisterEngineConversation(conversation_id)]
            }
            EngineEvent::AgentResponse(_) => {
                let after = self.state.window.duration();
                if after.is_zero() {
                    return Vec::new();
                }
                let generation = self.state.window.restart(now);
                vec![CallAction::StartWindowTimer { generation, after }]
            }
            EngineEvent::Audio(payload) => self
                .state
                .stream_sid
                .as_deref()
                .map(|sid| vec![CallAction::ToStream(StreamCommand::media(sid, payload))])
                .unwrap_or_default(),
            EngineEvent::Ping { event_id } => {
                vec![CallAction::ToEngine(EngineCommand::Pong { event_id })]
            }
            EngineEvent::Interruption => self
                .state
                .stream_sid
                .as_deref()
                .map(|sid| vec![CallAction::ToStream(StreamCommand::clear(sid))])
                .unwrap_or_default(),
            EngineEvent::UserTranscript(_) | EngineEvent::Error(_) | EngineEvent::Ignored(_) => {
                Vec::new()
            }
        }
    }

    fn teardown(&mut self) -> Vec<CallAction> {
        if !self.state.phase.is_active() {
            return Vec::new();
        }
        self.state.enter(CallPhase::Terminating);
        let s = &self.state;
        let plan = TeardownPlan {
            call_sid: s.call_sid.clone(),
            phone: s.phone.clone(),
            profile: s.profile.clone(),
            conversation_id: s.conversation_id.clone(),
            engine_conversation_id: s.engine_conversation_id.clone(),
            classification: s.classification,
            voicemail: s.voicemail,
        };
        let mut actions = Vec::with_capacity(2);
        if s.engine_connected {
            actions.push(CallAction::CloseEngine);
        }
        actions.push(CallAction::Teardown(Box::new(plan)));
        self.state.reset();
        actions
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::telephony::media::{InboundMedia, MarkBody, StreamStart};
    use chrono::TimeZone;

    fn settings() -> CallSettings {
        CallSettings {
            non_interruptible: Duration::from_millis(1500),
            prompt_refresh: vec![Duration::from_secs(720)],
        }
    }

    fn profile() -> Profile {
        Profile {
            id: "p1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: None,
            phone: "+15555550100".into(),
            timezone: "America/New_York".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn start() -> CallInput {
        CallInput::Stream(StreamEvent::Start {
            start: StreamStart {
                stream_sid: "MZ1".into(),
                call_sid: "CA1".into(),
            },
        })
    }

    fn media(payload: &str) -> CallInput {
        CallInput::Stream(StreamEvent::Media {
            media: InboundMedia {
                timestamp: Some(40),
                payload: payload.into(),
            },
        })
    }

    fn outcome(profile: Option<Profile>, is_scheduled: bool, connected: bool) -> CallInput {
        CallInput::SetupFinished(Box::new(SetupOutcome {
            phone: Some("+15555550100".into()),
            conversation_id: profile.as_ref().map(|_| "conv-1".to_owned()),
            profile,
            classification: CallClassification {
                is_scheduled,
                max_call_number: 2,
            },
            call_started: Utc::now(),
            engine_connected: connected,
        }))
    }

    fn streaming(is_scheduled: bool) -> CallMachine {
        let mut m = CallMachine::new(settings());
        let now = Instant::now();
        m.handle(start(), now);
        m.handle(outcome(Some(profile()), is_scheduled, true), now);
        m
    }

    fn teardown_plan(actions: &[CallAction]) -> TeardownPlan {
        actions
            .iter()
            .find_map(|a| match a {
                CallAction::Teardown(plan) => Some((**plan).clone()),
                _ => None,
            })
            .expect("teardown action")
    }

    #[test]
    fn start_begins_setup() {
        let mut m = CallMachine::new(settings());
        let actions = m.handle(start(), Instant::now());
        assert_eq!(
            actions,
            vec![CallAction::BeginSetup {
                stream_sid: "MZ1".into(),
                call_sid: "CA1".into()
            }]
        );
        assert_eq!(m.state().phase, CallPhase::Setup);
        assert!(m.handle(start(), Instant::now()).is_empty());
    }

    #[test]
    fn scheduled_setup_schedules_prompt_refresh() {
        let mut m = CallMachine::new(settings());
        let now = Instant::now();
        m.handle(start(), now);
        let actions = m.handle(outcome(Some(profile()), true, true), now);
        assert_eq!(
            actions,
            vec![CallAction::ScheduleRefresh {
                index: 0,
                after: Duration::from_secs(720)
            }]
        );
        assert_eq!(m.state().phase, CallPhase::Streaming);
        assert_eq!(m.handle(CallInput::PromptRefreshDue, now), vec![CallAction::RefreshPrompt]);
    }

    #[test]
    fn unscheduled_calls_never_refresh() {
        let mut m = streaming(false);
        assert!(m.handle(CallInput::PromptRefreshDue, Instant::now()).is_empty());
    }

    #[test]
    fn engine_event_dispatch() {
        let mut m = streaming(true);
        let now = Instant::now();
        assert_eq!(
            m.handle(
                CallInput::Engine(EngineEvent::InitiationMetadata {
                    conversation_id: "el-1".into()
                }),
                now
            ),
            vec![CallAction::RegisterEngineConversation("el-1".into())]
        );
        assert_eq!(m.state().engine_conversation_id.as_deref(), Some("el-1"));
        assert_eq!(
            m.handle(CallInput::Engine(EngineEvent::Audio("QUJD".into())), now),
            vec![CallAction::ToStream(StreamCommand::media("MZ1", "QUJD".into()))]
        );
        assert_eq!(
            m.handle(CallInput::Engine(EngineEvent::Ping { event_id: 7 }), now),
            vec![CallAction::ToEngine(EngineCommand::Pong { event_id: 7 })]
        );
        assert_eq!(
            m.handle(CallInput::Engine(EngineEvent::Interruption), now),
            vec![CallAction::ToStream(StreamCommand::clear("MZ1"))]
        );
        for quiet in [
            EngineEvent::UserTranscript("hi".into()),
            EngineEvent::Error("boom".into()),
            EngineEvent::Ignored("internal_vad_score".into()),
        ] {
            assert!(m.handle(CallInput::Engine(quiet), now).is_empty());
        }
    }

    #[test]
    fn window_drops_caller_audio_until_current_expiry() {
        let mut m = streaming(true);
        let now = Instant::now();
        assert_eq!(
            m.handle(media("AAA"), now),
            vec![CallAction::ToEngine(EngineCommand::AudioChunk("AAA".into()))]
        );

        let first = m.handle(CallInput::Engine(EngineEvent::AgentResponse("one".into())), now);
        let second = m.handle(CallInput::Engine(EngineEvent::AgentResponse("two".into())), now);
        let generation_of = |actions: &[CallAction]| match actions {
            [CallAction::StartWindowTimer { generation, after }] => {
                assert_eq!(*after, Duration::from_millis(1500));
                *generation
            }
            other => panic!("unexpected actions {other:?}"),
        };
        let (g1, g2) = (generation_of(&first), generation_of(&second));
        assert!(m.handle(media("BBB"), now).is_empty());

        m.handle(CallInput::WindowExpired { generation: g1 }, now);
        assert!(m.state().window.is_active());
        assert!(m.handle(media("CCC"), now).is_empty());

        m.handle(CallInput::WindowExpired { generation: g2 }, now);
        assert_eq!(m.handle(media("DDD"), now).len(), 1);
        assert_eq!(m.state().latest_media_timestamp, 40);
    }

    #[test]
    fn media_before_streaming_is_dropped() {
        let mut m = CallMachine::new(settings());
        let now = Instant::now();
        assert!(m.handle(media("AAA"), now).is_empty());
        m.handle(start(), now);
        assert!(m.handle(media("AAA"), now).is_empty());
    }

    #[test]
    fn marks_queue_in_order() {
        let mut m = streaming(true);
        for name in ["a", "b"] {
            m.handle(
                CallInput::Stream(StreamEvent::Mark {
                    mark: MarkBody { name: name.into() },
                }),
                Instant::now(),
            );
        }
        assert_eq!(m.state().mark_queue, ["a", "b"]);
    }

    #[test]
    fn stop_tears_down_into_post_call() {
        let mut m = streaming(true);
        let now = Instant::now();
        m.handle(
            CallInput::Engine(EngineEvent::InitiationMetadata {
                conversation_id: "el-1".into(),
            }),
            now,
        );
        let actions = m.handle(CallInput::Stream(StreamEvent::Stop {}), now);
        assert_eq!(actions[0], CallAction::CloseEngine);
        let plan = teardown_plan(&actions);
        assert_eq!(plan.follow_up(), FollowUp::PostCall);
        assert_eq!(plan.call_sid.as_deref(), Some("CA1"));

        assert_eq!(m.state().phase, CallPhase::Idle);
        assert!(m.state().profile.is_none());
        assert!(m.handle(CallInput::SocketClosed, now).is_empty());
    }

    #[test]
    fn voicemail_short_circuits_post_call() {
        let mut m = streaming(true);
        let now = Instant::now();
        m.handle(
            CallInput::Engine(EngineEvent::InitiationMetadata {
                conversation_id: "el-1".into(),
            }),
            now,
        );
        m.handle(CallInput::Voicemail, now);
        let plan = teardown_plan(&m.handle(CallInput::Stream(StreamEvent::Stop {}), now));
        assert_eq!(plan.follow_up(), FollowUp::VoicemailSms);
    }

    #[test]
    fn unknown_caller_gets_signup_link() {
        let mut m = CallMachine::new(settings());
        let now = Instant::now();
        m.handle(start(), now);
        m.handle(outcome(None, false, true), now);
        let plan = teardown_plan(&m.handle(CallInput::SocketClosed, now));
        assert_eq!(plan.follow_up(), FollowUp::SignupSms);
    }

    #[test]
    fn failed_engine_connect_ends_the_call() {
        let mut m = CallMachine::new(settings());
        let now = Instant::now();
        m.handle(start(), now);
        let actions = m.handle(outcome(Some(profile()), true, false), now);
        assert_eq!(actions.len(), 1);
        assert_eq!(teardown_plan(&actions).follow_up(), FollowUp::Nothing);
        assert_eq!(m.state().phase, CallPhase::Idle);
    }

    #[test]
    fn hang_up_closes_engine_once() {
        let mut m = streaming(true);
        let now = Instant::now();
        assert_eq!(m.handle(CallInput::HangUp, now), vec![CallAction::CloseEngine]);
        assert!(m.handle(CallInput::HangUp, now).is_empty());
        let actions = m.handle(CallInput::EngineClosed, now);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], CallAction::Teardown(_)));
    }
}
