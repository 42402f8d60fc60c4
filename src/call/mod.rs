//! Live phone calls: the per-call state machine, its timers, the session
//! runner that bridges the telephony media stream to the voice engine, and
//! the registries the gateway uses to find running calls.

pub mod control;
pub mod machine;
pub mod registry;
pub mod session;
pub mod state;
pub mod timers;

pub use control::{AnsweredBy, HangUpError, hang_up, mark_voicemail};
pub use machine::{CallAction, CallInput, CallMachine, CallSettings, FollowUp, TeardownPlan};
pub use registry::{CallControl, LiveCalls, PendingCall, PendingCalls};
pub use session::{AgentIds, CallServices, CallSession};
pub use state::{CallPhase, ConnectionState, InterruptWindow};
pub use timers::{CallTimers, TimerKey};
