//! Inbound SMS conversations and the signup welcome.
//!
//! Every text from a known number is logged, then checked in order for a
//! pending "what time works?" answer, a reschedule request and a request to
//! be called right now. Anything else gets a coaching reply generated from
//! the merged SMS and call history.

pub mod handler;
pub mod history;
pub mod intent;
pub mod welcome;

pub use handler::{SmsHandler, SmsOutcome};
pub use intent::{RescheduleIntent, RescheduleIntents};
pub use welcome::{WelcomeDelays, WelcomeSequence};
