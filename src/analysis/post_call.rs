//! The two-part follow-up text sent after a call that ended normally.

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::TranscriptTurn;

use super::has_enough_turns;

const SYSTEM_PROMPT: &str = "You are an executive coach creating personalized follow-up messages \
after coaching calls. Focus on being encouraging, specific, and action-oriented. Structure your \
response in two sections separated by ===";

const DELIMITER: &str = "===";

/// Split on the first `===`. Both parts must be non-empty.
pub fn split_post_call_message(raw: &str) -> Option<(String, String)> {
    let (first, second) = raw.split_once(DELIMITER)?;
    // A stray second delimiter belongs to neither message.
    let second = second.split(DELIMITER).next().unwrap_or_default();
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first.to_owned(), second.to_owned()))
}

fn build_prompt(turns: &[TranscriptTurn], action_items: &[String], coach_label: &str) -> String {
    let actions = if action_items.is_empty() {
        "- Skip the action items part as none were committed to".to_owned()
    } else {
        let items: Vec<String> = action_items.iter().map(|i| format!("  {i}")).collect();
        format!(
            "- Include these exact action items the client committed to:\n{}",
            items.join("\n")
        )
    };
    format!(
        "You are an executive coach sending a follow-up text message to a client 2 minutes after your coaching call ended.
Create a message in TWO distinct sections, separated by exactly \"===\". The sections should be:

SECTION 1:
- Acknowledge or show appreciation for the call that just ended without greeting the user
- Key insights and realizations they had during the call

SECTION 2:
{actions}
- A motivational closing that references their strengths shown in the conversation

If in this conversation you scheduled a next call with the user, mention it in the closing section.

The message should be personal, encouraging, and specific to what was discussed.
Use natural language and a professional tone suitable for SMS.
Keep each section concise as these will be sent as separate text messages.

Conversation:
{}",
        render_transcript(turns, coach_label)
    )
}

/// Generate the follow-up and split it. `None` on short calls, provider
/// failure, or a reply without two usable sections.
pub async fn create_post_call_message(
    providers: &Providers,
    turns: &[TranscriptTurn],
    action_items: &[String],
    coach_label: &str,
) -> Option<(String, String)> {
    if !has_enough_turns(turns) {
        return None;
    }
    let request = GenerationRequest::new(SYSTEM_PROMPT, build_prompt(turns, action_items, coach_label))
        .with_temperature(0.5)
        .with_max_tokens(2000);
    let raw = generate_or_none(providers.prose(), &request, "post-call message").await?;
    let parts = split_post_call_message(&raw);
    if parts.is_none() {
        tracing::error!("post-call message sections not properly formatted");
    }
    parts
}
