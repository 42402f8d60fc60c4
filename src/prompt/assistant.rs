//! Assistant persona: unknown callers and unscheduled calls.

use chrono::{DateTime, Utc};

use super::builder::{PromptBuilder, Section, render};
use super::{ProfileContext, persona_vars};
use crate::config::PersonaConfig;
use crate::scheduling::timezone::{local_now, parse_timezone};

const BASE_PERSONALITY: &str = include_str!("../../prompts/assistant_base.md");
const HAS_CALL: &str = include_str!("../../prompts/assistant_has_call.md");
const NO_CALL: &str = include_str!("../../prompts/assistant_no_call.md");
const DUTIES: &str = include_str!("../../prompts/assistant_duties.md");

/// Prompt for a caller with no profile.
pub fn unauthorized_prompt(persona: &PersonaConfig) -> PromptBuilder {
    let vars = persona_vars(persona);
    PromptBuilder::new()
        .section(Section::Personality, render(BASE_PERSONALITY, &vars))
        .section(
            Section::Instructions,
            format!(
                "INSTRUCTIONS:\nAlways start conversations with: \"{}\"",
                unauthorized_greeting(persona)
            ),
        )
}

/// Opening line for a caller with no profile.
pub fn unauthorized_greeting(persona: &PersonaConfig) -> String {
    format!(
        "Hi, this is {assistant}, {coach}'s assistant. I noticed you don't have an account with \
         us yet. To speak with {coach} please create an account at {url} and schedule a call!",
        assistant = persona.assistant_name,
        coach = persona.coach_name,
        url = persona.signup_url,
    )
}

/// Prompt for a known caller outside a scheduled slot: remind them of the
/// booked call, or help them book one.
pub fn unscheduled_prompt(
    ctx: &ProfileContext,
    persona: &PersonaConfig,
    now: DateTime<Utc>,
) -> PromptBuilder {
    let vars = persona_vars(persona);
    let tz = parse_timezone(&ctx.profile.timezone);
    let today = local_now(tz, now).format("%B %-d, %Y, %-I:%M %p");

    let scheduled = match &ctx.upcoming {
        Some(upcoming) => {
            let mut all: Vec<(&str, &str)> = vars.to_vec();
            all.push(("upcoming", upcoming.formatted.as_str()));
            render(HAS_CALL, &all)
        }
        None => render(NO_CALL, &vars),
    };

    PromptBuilder::new()
        .section(Section::Personality, render(BASE_PERSONALITY, &vars))
        .section(
            Section::DateTime,
            format!(
                "Today is {today}. User's timezone is {}.",
                ctx.profile.timezone
            ),
        )
        .section(Section::ScheduledCall, scheduled)
        .section(Section::Instructions, render(DUTIES, &vars))
}

/// First thing the assistant says when the session opens.
pub fn assistant_greeting(first_name: Option<&str>, persona: &PersonaConfig) -> String {
    let name = first_name
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!(" {n}"))
        .unwrap_or_default();
    format!(
        "Hi{name}, this is {}, {}'s assistant. How can I help you today?",
        persona.assistant_name, persona.coach_name
    )
}
