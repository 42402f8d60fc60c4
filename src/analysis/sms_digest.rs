//! Rolling summaries of the SMS thread, one per full batch of messages.

use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::store::{Message, RecordStore, StoreResult, SummaryKind};

const SYSTEM_PROMPT: &str = "You are an executive coach creating extremely concise summaries of \
text message exchanges with clients. Keep summaries to 2-3 sentences maximum, focusing only on \
the most essential information.";

/// Number of digests missing for `message_count` messages when `existing`
/// are already stored.
pub fn digests_needed(message_count: usize, existing: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    (message_count / batch_size).saturating_sub(existing)
}

fn digest_request(batch: &[Message]) -> GenerationRequest {
    let lines: Vec<String> = batch
        .iter()
        .map(|m| format!("{}: {}", m.sender.as_str(), m.content))
        .collect();
    GenerationRequest::new(
        SYSTEM_PROMPT,
        format!(
            "You are an executive coach reviewing text message exchanges with a client to create a very brief summary.
Create an extremely concise summary (2-3 sentences maximum) that captures only the most essential points of the conversation.

Text message exchange:
{}

IMPORTANT: Return only your summary, keeping it extremely brief. This is just for internal reference.",
            lines.join("\n")
        ),
    )
    .with_temperature(0.0)
    .with_max_tokens(300)
}

/// Summarize every complete, not yet summarized batch of `batch_size`
/// messages. Returns how many digests were stored.
pub async fn store_sms_summaries(
    providers: &Providers,
    store: &dyn RecordStore,
    profile_id: &str,
    batch_size: usize,
) -> StoreResult<usize> {
    let messages = store.list_messages(profile_id).await?;
    let existing = store
        .list_summaries(SummaryKind::Sms, profile_id)
        .await?
        .len();
    let needed = digests_needed(messages.len(), existing, batch_size);
    if needed == 0 {
        return Ok(0);
    }
    tracing::info!(profile_id, needed, existing, "creating sms digests");

    let mut stored = 0;
    for i in 0..needed {
        let start = (existing + i) * batch_size;
        let Some(batch) = messages.get(start..start + batch_size) else {
            break;
        };
        let Some(digest) =
            generate_or_none(providers.prose(), &digest_request(batch), "sms digest").await
        else {
            // Later batches would be stored out of order.
            break;
        };
        store
            .insert_summary(SummaryKind::Sms, profile_id, None, digest.trim())
            .await?;
        stored += 1;
    }
    Ok(stored)
}
