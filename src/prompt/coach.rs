//! Coach persona prompts: discovery, numbered coaching calls and
//! time-based call phases.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::builder::{PromptBuilder, Section, render};
use super::{ProfileContext, persona_vars};
use crate::config::PersonaConfig;
use crate::scheduling::timezone::{local_now, parse_timezone};

const BASE_PERSONALITY: &str = include_str!("../../prompts/coach_base.md");
const DISCOVERY_CALL: &str = include_str!("../../prompts/discovery_call.md");
const FIRST_COACHING_CALL: &str = include_str!("../../prompts/first_coaching_call.md");
const SECOND_COACHING_CALL: &str = include_str!("../../prompts/second_coaching_call.md");
const PHASE_ASSESSMENT: &str = include_str!("../../prompts/phase_assessment.md");
const PHASE_SOLUTION: &str = include_str!("../../prompts/phase_solution.md");
const PHASE_ACTION_PLANNING: &str = include_str!("../../prompts/phase_action_planning.md");
const PHASE_WRAP_UP: &str = include_str!("../../prompts/phase_wrap_up.md");

const BREVITY: &str = "Be aware that you must be brief in your answers, so never use more than \
2 sentences. The idea is to make the user talk more than you do.";

/// Stage of a coaching call by elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// 0–2 minutes.
    Introduction,
    /// 2–3 minutes.
    Assessment,
    /// 3–8 minutes.
    SolutionFinding,
    /// 8–12 minutes.
    ActionPlanning,
    /// Past 12 minutes.
    WrapUp,
}

impl CallPhase {
    pub fn from_elapsed(elapsed: Duration) -> Self {
        match elapsed.as_secs() {
            s if s > 720 => Self::WrapUp,
            s if s > 480 => Self::ActionPlanning,
            s if s > 180 => Self::SolutionFinding,
            s if s > 120 => Self::Assessment,
            _ => Self::Introduction,
        }
    }

    fn template(self) -> Option<&'static str> {
        match self {
            Self::Introduction => None,
            Self::Assessment => Some(PHASE_ASSESSMENT),
            Self::SolutionFinding => Some(PHASE_SOLUTION),
            Self::ActionPlanning => Some(PHASE_ACTION_PLANNING),
            Self::WrapUp => Some(PHASE_WRAP_UP),
        }
    }
}

fn call_plan(max_call_number: usize) -> Option<&'static str> {
    match max_call_number {
        1 => Some(FIRST_COACHING_CALL),
        2..=4 => Some(SECOND_COACHING_CALL),
        _ => None,
    }
}

fn date_time_line(ctx: &ProfileContext, now: DateTime<Utc>) -> String {
    let tz = parse_timezone(&ctx.profile.timezone);
    let local = local_now(tz, now);
    format!(
        "Current time is {} on {} and the user's timezone is {}. Always schedule calls in the \
         user's timezone.",
        local.format("%H:%M:%S"),
        local.format("%Y-%m-%d"),
        ctx.profile.timezone
    )
}

/// The coach system prompt for a call `elapsed` into the conversation.
///
/// `max_call_number` is the number of earlier coach calls; zero selects the
/// discovery script.
pub fn coach_prompt(
    ctx: &ProfileContext,
    persona: &PersonaConfig,
    max_call_number: usize,
    elapsed: Duration,
    now: DateTime<Utc>,
) -> PromptBuilder {
    let vars = persona_vars(persona);
    let tz_name = ctx.profile.timezone.as_str();
    let with_tz = |template: &str| {
        let mut all: Vec<(&str, &str)> = vars.to_vec();
        all.push(("timezone", tz_name));
        render(template, &all)
    };
    let first_name = ctx.profile.first_name.as_str();

    if max_call_number == 0 {
        return PromptBuilder::new()
            .section(Section::Personality, with_tz(BASE_PERSONALITY))
            .section(Section::DateTime, date_time_line(ctx, now))
            .section(
                Section::CallPlan,
                format!("This is your first call with {first_name}."),
            )
            .titled(
                Section::SmsSummaries,
                "PREVIOUS SMS CONVERSATION SUMMARIES",
                &ctx.bulleted_sms_summaries(),
            )
            .section(Section::Instructions, with_tz(DISCOVERY_CALL));
    }

    let phase = CallPhase::from_elapsed(elapsed);
    PromptBuilder::new()
        .section(Section::Personality, with_tz(BASE_PERSONALITY))
        .optional(Section::Phase, phase.template().map(with_tz))
        .optional(Section::CallPlan, call_plan(max_call_number).map(with_tz))
        .section(Section::DateTime, date_time_line(ctx, now))
        .section(
            Section::CallCount,
            format!("This is call number {} with {first_name}.", ctx.coach_call_count),
        )
        .titled(
            Section::KeyInformation,
            &ctx.key_information_title(),
            &ctx.entities,
        )
        .titled(
            Section::SmsSummaries,
            "SMS CONVERSATION SUMMARIES",
            &ctx.bulleted_sms_summaries(),
        )
        .titled(
            Section::PreviousSummaries,
            "PREVIOUS CONVERSATIONS SUMMARY",
            &ctx.previous_short_summaries(),
        )
        .optional(
            Section::LastDetailed,
            ctx.last_detailed_summary()
                .map(|d| format!("== LAST CONVERSATION DETAILED SUMMARY: ==\n{d}")),
        )
        .section(Section::Instructions, BREVITY)
}

/// First thing the coach says when the session opens.
pub fn coach_greeting(first_name: &str, persona: &PersonaConfig) -> String {
    format!(
        "Hi {first_name}, this is {}. How are you doing today?",
        persona.coach_short_name
    )
}
