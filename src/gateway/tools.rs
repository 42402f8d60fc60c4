//! Tool endpoints the voice agent calls mid-conversation: coaching
//! technique cards and a web search.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::{GatewayState, error_json, json_body};
use crate::llm::GenerationRequest;

/// A technique card: when to use it and phrasings to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoachingTechnique {
    pub technique: &'static str,
    pub instruction: &'static str,
    pub examples: &'static [&'static str],
}

const INSPIRATION: &str =
    "The tool returns examples that you should use as inspiration to generate your response.";

pub const POWERFUL_QUESTIONS: CoachingTechnique = CoachingTechnique {
    technique: "Powerful Questions",
    instruction: "Use when a client seems stuck, unsure about their next step, or needs deeper self-reflection.",
    examples: &[
        "What outcome do you truly want from this situation?",
        "If failure weren't an option, what would you do?",
        "What's the biggest assumption you're making right now?",
        "What would your future self thank you for doing today?",
        "If you had all the answers, what would they be?",
        "How would you approach this if you were coaching someone else?",
        "What's the one thing that, if changed, would make the biggest difference?",
        "What's stopping you from making this decision?",
        "How does this align with your long-term goals?",
        "What would happen if you did nothing?",
    ],
};

pub const ACTIVE_LISTENING: CoachingTechnique = CoachingTechnique {
    technique: "Active Listening",
    instruction: "Use when a client is sharing a challenge, expressing emotions, or when clarity is needed.",
    examples: &[
        "I hear you saying that you feel overwhelmed. What's the biggest source of that?",
        "So if I understand correctly, you're debating between two paths. What's your gut telling you?",
        "You mentioned this isn't the first time you've faced this. How did you handle it before?",
        "It sounds like this decision is really important to you. What's the core reason?",
        "I'm noticing a lot of excitement in your voice. What's lighting you up about this?",
        "You seem hesitant. What's making you pause?",
        "If I reflect back, it sounds like you're feeling stuck due to a lack of clarity. Is that accurate?",
        "It seems like you're trying to balance logic with emotion. What's pulling you in each direction?",
        "What I'm hearing is that you're torn between staying safe and taking a risk. What's your biggest fear?",
        "You've said this is important to you multiple times. What's at stake if you don't take action?",
    ],
};

pub const SILENCE_FOR_THINKING: CoachingTechnique = CoachingTechnique {
    technique: "Silence for Thinking",
    instruction: "Use when a client says that they need to think about your question before answering.",
    examples: &[
        "No rush!",
        "Of course. Take your time",
        "Don't overthink it, what does your intuition say?",
        "Yeah, I'll give you a moment to think.",
        "Just sit with that thought for a moment",
        "No need to rush, take your time",
    ],
};

pub const REFRAME_PERSPECTIVE: CoachingTechnique = CoachingTechnique {
    technique: "Reframe Perspective",
    instruction: "Use when a client is stuck in a negative mindset and needs to be reframed.",
    examples: &[
        "What would this look like from an outsider's point of view?",
        "If this were a challenge instead of a problem, how would you approach it?",
        "What's one potential opportunity hidden within this obstacle?",
        "How would you handle this if you were your mentor?",
        "If this was happening to your best friend, what advice would you give them?",
        "How might you see this in a year? Five years?",
        "If this weren't a setback but a setup for something bigger, what could that be?",
        "What's a more empowering way to look at this situation?",
        "If you replaced frustration with curiosity, what would you ask yourself?",
        "What's one thing you can learn from this experience?",
    ],
};

pub const WHAT_SHOULD_I_DO: CoachingTechnique = CoachingTechnique {
    technique: "What Should I Do",
    instruction: "Use when a user asks for direct advice. Instead of telling them what to do, guide them to their own insights through powerful questions.",
    examples: &[
        "What options have you considered so far?",
        "What would success look like in this situation?",
        "What's holding you back from making a decision?",
        "Which path feels most aligned with your values?",
        "What would you advise a friend in this situation?",
        "What's the worst that could happen, and how would you handle it?",
        "What does your intuition tell you about this?",
        "What additional information would help you decide?",
        "How does each option align with your long-term goals?",
        "What would make this decision feel easier?",
    ],
};

impl CoachingTechnique {
    /// Card for a tool route slug such as `powerful-questions`.
    pub fn by_slug(slug: &str) -> Option<Self> {
        Some(match slug {
            "powerful-questions" => POWERFUL_QUESTIONS,
            "active-listening" => ACTIVE_LISTENING,
            "silence-thinking" => SILENCE_FOR_THINKING,
            "reframe-perspective" => REFRAME_PERSPECTIVE,
            "what-should-i-do" => WHAT_SHOULD_I_DO,
            _ => return None,
        })
    }
}

/// Wire form sent to the agent: the instruction carries the usage note.
#[derive(Debug, Serialize)]
struct TechniqueCard {
    technique: &'static str,
    instruction: String,
    examples: &'static [&'static str],
}

impl From<CoachingTechnique> for TechniqueCard {
    fn from(t: CoachingTechnique) -> Self {
        Self {
            technique: t.technique,
            instruction: format!("{} {INSPIRATION}", t.instruction),
            examples: t.examples,
        }
    }
}

/// `GET /api/tools/{technique}`.
pub async fn coaching_technique(Path(slug): Path<String>) -> Response {
    match CoachingTechnique::by_slug(&slug) {
        Some(technique) => {
            tracing::info!(technique = technique.technique, "coaching technique requested");
            Json(TechniqueCard::from(technique)).into_response()
        }
        None => error_json(StatusCode::NOT_FOUND, &format!("Unknown tool {slug}")),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// `POST /api/tools/search-the-web`: answer `prompt` with the search model.
/// The response body is the answer as a JSON string.
pub async fn search_the_web(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request: SearchRequest = match json_body(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let Some(prompt) = request.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "prompt is required");
    };

    tracing::info!(%prompt, "web search requested");
    match state
        .providers
        .search()
        .generate(&GenerationRequest::new("", prompt))
        .await
    {
        Ok(answer) => (StatusCode::OK, Json(answer)).into_response(),
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "web search failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to search the web")
        }
    }
}
