//! Short and detailed call summaries.

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::TranscriptTurn;

use super::has_enough_turns;

const SHORT_SYSTEM: &str = "You are an executive coach reviewing your own coaching conversations \
to keep brief notes. Write concise summaries that capture the main topic, the client's key \
realization and any commitments.";

const DETAILED_SYSTEM: &str = "You are an executive coach reviewing your own coaching \
conversations to summarize them. Create detailed, insightful summaries that capture both the \
content and the transformational aspects of coaching conversations. Use natural language and a \
professional tone.";

/// A matched pair of summaries for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPair {
    pub short: String,
    pub detailed: String,
}

fn short_request(transcript: &str) -> GenerationRequest {
    GenerationRequest::new(
        SHORT_SYSTEM,
        format!(
            "Summarize this coaching conversation in 2-3 sentences. Mention the main topic \
             discussed and what the client decided to do next.

Conversation:
{transcript}

IMPORTANT: Return only your summary, as if you are writing a note for yourself."
        ),
    )
    .with_temperature(0.0)
    .with_max_tokens(500)
}

fn detailed_request(transcript: &str) -> GenerationRequest {
    GenerationRequest::new(
        DETAILED_SYSTEM,
        format!(
            "You are an executive coach reviewing your own coaching conversations with clients to summarize them and have better insights for next calls.
Create a detailed, insightful summary that capture both the content of and the transformational aspects of the conversation.
Use natural language and a professional tone. Organize the information in a logical flow, but don't use headers or bullet points.

Conversation:
{transcript}

IMPORTANT: Return only your summary, as if you are writing a document for yourself."
        ),
    )
    .with_temperature(0.0)
    .with_max_tokens(2000)
}

/// Generate both summaries concurrently. `None` unless both succeed.
pub async fn generate_summaries(
    providers: &Providers,
    turns: &[TranscriptTurn],
    coach_label: &str,
) -> Option<SummaryPair> {
    if !has_enough_turns(turns) {
        return None;
    }
    let transcript = render_transcript(turns, coach_label);
    let (short_req, detailed_req) = (short_request(&transcript), detailed_request(&transcript));
    let (short, detailed) = tokio::join!(
        generate_or_none(providers.prose(), &short_req, "short summary"),
        generate_or_none(providers.prose(), &detailed_req, "detailed summary"),
    );
    match (short, detailed) {
        (Some(short), Some(detailed)) if !short.trim().is_empty() && !detailed.trim().is_empty() => {
            Some(SummaryPair {
                short: short.trim().to_owned(),
                detailed: detailed.trim().to_owned(),
            })
        }
        _ => {
            tracing::warn!("one or both summaries missing, storing neither");
            None
        }
    }
}
