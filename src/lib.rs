//! Coachline: a phone and SMS executive-coaching assistant.
//!
//! Clients talk to an AI coach over the phone and by text message. The
//! crate bridges telephony media streams to a conversational voice engine,
//! then turns each finished call into summaries, notes and the next booking:
//! Caller → Telephony stream → Voice engine → Transcript → Analysis → SMS
//!
//! # Architecture
//!
//! - **Gateway**: axum routes for telephony webhooks and the media stream
//! - **Call**: per-call state machine, timers and the stream/engine bridge
//! - **Recording**: recording download, blob upload and transcript fetch
//! - **Analysis**: summaries, notes, action items and SMS digests via LLMs
//! - **Scheduling**: extracting, validating and booking the next call
//! - **SMS**: inbound text handling and the signup welcome
//! - **Sweeps**: reminders, call-time dialing, no-shows and nudges
//! - **Store**: SQLite record store for profiles, calls and messages

pub mod analysis;
pub mod app_dirs;
pub mod blob;
pub mod call;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod notify;
pub mod prompt;
pub mod recording;
pub mod retry;
pub mod scheduling;
pub mod services;
pub mod sms;
pub mod store;
pub mod sweeps;
pub mod telephony;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::CoachConfig;
pub use error::{CoachError, Result};
pub use gateway::{GatewayServer, GatewayState};
pub use services::{Collaborators, Services};
