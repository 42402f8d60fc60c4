//! Did the call end with a goodbye or get cut off?

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::TranscriptTurn;

use super::has_enough_turns;

const SYSTEM_PROMPT: &str =
    "You are a conversation analyzer. You must respond with ONLY 'YES' or 'NO', with no additional text.";

/// Turns shown to the classifier.
const TAIL_TURNS: usize = 3;

/// `true` only for an exact `YES`.
pub fn parse_ending_answer(answer: &str) -> bool {
    answer.trim() == "YES"
}

/// Whether the call ended normally. Short transcripts and provider failures
/// count as normal so nobody gets a "call dropped" text by mistake.
pub async fn classify_ending(
    providers: &Providers,
    turns: &[TranscriptTurn],
    coach_label: &str,
) -> bool {
    if !has_enough_turns(turns) {
        tracing::debug!(turns = turns.len(), "transcript too short to classify ending");
        return true;
    }
    let tail = &turns[turns.len().saturating_sub(TAIL_TURNS)..];
    let prompt = format!(
        "Analyze these last 3 conversation entries and determine if the call ended normally or abruptly.
Answer ONLY with YES if the call ended normally (with proper goodbyes or natural conclusion) or NO if it seems to have ended abruptly.
Do not explain your reasoning, just answer YES or NO.

Conversation entries:
{}",
        render_transcript(tail, coach_label)
    );
    let request = GenerationRequest::new(SYSTEM_PROMPT, prompt)
        .with_temperature(0.0)
        .with_max_tokens(1);

    match generate_or_none(providers.prose(), &request, "call ending").await {
        Some(answer) => {
            let normal = parse_ending_answer(&answer);
            tracing::info!(normal, "classified call ending");
            normal
        }
        None => true,
    }
}
