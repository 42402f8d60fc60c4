//! Actions the client explicitly committed to during the call.

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::TranscriptTurn;

use super::has_enough_turns;

const SYSTEM_PROMPT: &str = "You are an AI that extracts explicitly agreed upon action items \
from coaching conversations. Only return items the client clearly committed to doing.";

/// Returned by the model when nothing was committed to.
pub const NO_ACTION_ITEMS: &str = "NO_ACTION_ITEMS";

/// One item per non-empty line, with list markers removed.
pub fn parse_action_items(raw: &str) -> Vec<String> {
    if raw.trim() == NO_ACTION_ITEMS {
        return Vec::new();
    }
    raw.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty() && *line != NO_ACTION_ITEMS)
        .map(str::to_owned)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .unwrap_or(line);
    // "1. " / "12) "
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0
        && let Some(rest) = line[digits..]
            .strip_prefix(". ")
            .or_else(|| line[digits..].strip_prefix(") "))
    {
        return rest.trim();
    }
    line.trim()
}

/// Committed action items, or nothing for short calls and provider failure.
pub async fn extract_action_items(
    providers: &Providers,
    turns: &[TranscriptTurn],
    coach_label: &str,
) -> Vec<String> {
    if !has_enough_turns(turns) {
        return Vec::new();
    }
    let prompt = format!(
        "Analyze this coaching conversation and extract ONLY the specific action items that the client explicitly agreed to do.

Important guidelines:
- Only include actions the client clearly committed to doing
- If they changed their mind later in the conversation, only include the final version
- Do not infer or suggest actions they didn't explicitly agree to
- Return each action item on a new line
- If no clear action items were committed to, return \"{NO_ACTION_ITEMS}\"
- Do not include any explanatory text, only the action items themselves

Example output:
Schedule meeting with marketing team by Friday
Send progress report to mentor
Practice meditation for 10 minutes daily

Conversation:
{}",
        render_transcript(turns, coach_label)
    );
    let request = GenerationRequest::new(SYSTEM_PROMPT, prompt)
        .with_temperature(0.0)
        .with_max_tokens(1000);
    generate_or_none(providers.prose(), &request, "action items")
        .await
        .map(|raw| parse_action_items(&raw))
        .unwrap_or_default()
}
