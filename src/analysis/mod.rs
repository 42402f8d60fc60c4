//! Post-call analysis: ending classification, facts, summaries, action
//! items, the follow-up text, and SMS thread digests.
//!
//! Every step is best-effort. A failed step is logged and yields nothing;
//! the pipeline moves on to the next one.

pub mod action_items;
pub mod ending;
pub mod entities;
pub mod pipeline;
pub mod post_call;
pub mod sms_digest;
pub mod summaries;

pub use pipeline::{PostCallJob, PostCallPipeline, PostCallReport};
pub use sms_digest::store_sms_summaries;

use crate::store::TranscriptTurn;

/// Transcripts shorter than this are not analyzed.
pub const MIN_ANALYSIS_TURNS: usize = 4;

pub(crate) fn has_enough_turns(turns: &[TranscriptTurn]) -> bool {
    turns.len() >= MIN_ANALYSIS_TURNS
}
