//! Locating and decoding JSON in free-text model output.

use serde::de::DeserializeOwned;

use crate::llm::error::ProviderError;

/// Extract a JSON block from potentially wrapped LLM output.
///
/// Handles markdown code fences (```json ... ```) and plain JSON objects
/// surrounded by prose.
pub fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    if let Some(start) = trimmed.find('{')
        && let Some(end) = trimmed.rfind('}')
        && end > start
    {
        return &trimmed[start..=end];
    }

    trimmed
}

/// Decode the JSON object embedded in `raw` into `T`.
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    let block = extract_json_block(raw);
    serde_json::from_str(block).map_err(|e| {
        ProviderError::Parse(format!("invalid JSON in model output: {e}"))
    })
}
