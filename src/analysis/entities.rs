//! Key facts about the client, extracted after each call.

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::TranscriptTurn;

use super::has_enough_turns;

const SYSTEM_PROMPT: &str = "You are an executive coach reviewing your own coaching conversations \
to note down key information about your client.
Be precise and only include information explicitly mentioned in the conversation.
Only return new information not previously known.
If no new information is found, return null.";

/// Split a model answer into one fact per sentence, each ending in a period.
/// `null` and blank answers yield nothing.
pub fn split_entities(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Vec::new();
    }
    trimmed
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s}."))
        .collect()
}

fn build_prompt(turns: &[TranscriptTurn], previous: &[String], coach_label: &str) -> String {
    let known = if previous.is_empty() {
        String::new()
    } else {
        format!(
            "Here are previously known facts about the user that you should NOT repeat:\n{}\n\n\
             Please ONLY extract NEW information that is not mentioned above.\n",
            previous.join("\n")
        )
    };
    format!(
        "You are an executive coach reviewing your own coaching conversations to note down key information about your client.
Extract any important personal or professional information mentioned, such as:
- Names of people (family, colleagues, etc.)
- Locations (city, country, etc.)
- Company details
- Financial information
- Personal goals
- Professional challenges
- Key dates or timelines
- Any other important information

{known}
IMPORTANT:
- If no new information is found, return null
- Do not include phrases like \"no new information\" or \"nothing to report\"
- Only return actual information about the user.
- After each key information, add a period.
- Always use the name of the user in the information.
- Do not include next session scheduling information.

You must return ONLY the information in natural language without any additional text. Perfect example:
\"John Doe is Paul's best friend. Paul lives in San Francisco. Company XYZ is a competitor of Paul's company. Paul is trying to raise $100,000 from investors.\"

Conversation:
{}",
        render_transcript(turns, coach_label)
    )
}

/// New facts from the call, excluding `previous`.
pub async fn extract_entities(
    providers: &Providers,
    turns: &[TranscriptTurn],
    previous: &[String],
    coach_label: &str,
) -> Vec<String> {
    if !has_enough_turns(turns) {
        return Vec::new();
    }
    let request = GenerationRequest::new(SYSTEM_PROMPT, build_prompt(turns, previous, coach_label))
        .with_temperature(0.0)
        .with_max_tokens(1000);
    generate_or_none(providers.prose(), &request, "entities")
        .await
        .map(|raw| split_entities(&raw))
        .unwrap_or_default()
}
