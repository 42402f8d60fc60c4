//! Per-call connection state.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::scheduling::CallClassification;
use crate::store::Profile;

/// Call lifecycle.
///
/// ```text
/// Idle → Setup → Streaming → Terminating → Idle
///          ↓                      ↑
///          └──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPhase {
    /// No stream attached yet, or the previous one was torn down.
    #[default]
    Idle,
    /// `start` received; resolving the caller and opening the engine.
    Setup,
    /// Audio flows both ways.
    Streaming,
    /// Teardown in progress.
    Terminating,
}

impl CallPhase {
    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Setup)
                | (Self::Setup, Self::Streaming)
                | (Self::Setup, Self::Terminating)
                | (Self::Streaming, Self::Terminating)
                | (Self::Terminating, Self::Idle)
        )
    }

    /// Whether a teardown still has something to tear down.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Setup | Self::Streaming)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Setup => "setup",
            Self::Streaming => "streaming",
            Self::Terminating => "terminating",
        };
        f.write_str(label)
    }
}

/// Window after each agent response during which caller audio is dropped,
/// so background noise cannot cut the agent off mid-sentence.
///
/// Every restart bumps `generation`; an expiry carrying an older generation
/// is stale and leaves the window open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptWindow {
    active: bool,
    started_at: Option<Instant>,
    duration: Duration,
    generation: u64,
}

impl InterruptWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            active: false,
            started_at: None,
            duration,
            generation: 0,
        }
    }

    /// Open (or reopen) the window. Returns the generation the matching
    /// expiry must carry.
    pub fn restart(&mut self, now: Instant) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.active = true;
        self.started_at = Some(now);
        self.generation
    }

    /// Close the window if `generation` is current. Returns whether it closed.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.active {
            return false;
        }
        self.active = false;
        self.started_at = None;
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }
}

/// Everything known about one live call. Owned by the call's task.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub phase: CallPhase,
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    /// Caller number, when known.
    pub phone: Option<String>,
    pub engine_conversation_id: Option<String>,
    pub profile: Option<Profile>,
    pub conversation_id: Option<String>,
    pub classification: CallClassification,
    pub call_started: Option<DateTime<Utc>>,
    /// Telephony media timestamp (ms since stream start).
    pub latest_media_timestamp: u64,
    pub mark_queue: VecDeque<String>,
    pub engine_connected: bool,
    pub window: InterruptWindow,
    pub voicemail: bool,
}

impl ConnectionState {
    pub fn new(window: Duration) -> Self {
        Self {
            phase: CallPhase::Idle,
            stream_sid: None,
            call_sid: None,
            phone: None,
            engine_conversation_id: None,
            profile: None,
            conversation_id: None,
            classification: CallClassification::default(),
            call_started: None,
            latest_media_timestamp: 0,
            mark_queue: VecDeque::new(),
            engine_connected: false,
            window: InterruptWindow::new(window),
            voicemail: false,
        }
    }

    /// Back to a fresh `Idle` state. The window duration is configuration
    /// and survives.
    pub fn reset(&mut self) {
        *self = Self::new(self.window.duration());
    }

    /// Move to `target`, refusing invalid transitions.
    pub fn enter(&mut self, target: CallPhase) -> bool {
        if !self.phase.can_transition_to(target) {
            tracing::warn!(from = %self.phase, to = %target, "ignored invalid call phase transition");
            return false;
        }
        tracing::debug!(from = %self.phase, to = %target, "call phase transition");
        self.phase = target;
        true
    }
}
