//! SMS coaching replies.

use chrono::{DateTime, Utc};

use super::builder::{PromptBuilder, Section, render};
use super::{ProfileContext, persona_vars};
use crate::config::PersonaConfig;
use crate::scheduling::timezone::{local_now, parse_timezone};

const SMS_PERSONALITY: &str = include_str!("../../prompts/sms_coach.md");

/// System prompt for a text reply.
pub fn sms_system_prompt(
    ctx: &ProfileContext,
    persona: &PersonaConfig,
    now: DateTime<Utc>,
) -> PromptBuilder {
    let local = local_now(parse_timezone(&ctx.profile.timezone), now);
    PromptBuilder::new()
        .section(Section::Personality, render(SMS_PERSONALITY, &persona_vars(persona)))
        .section(
            Section::DateTime,
            format!(
                "Today is {} at {}. User's timezone is {}.",
                local.format("%Y-%m-%d"),
                local.format("%H:%M:%S"),
                ctx.profile.timezone
            ),
        )
        .titled(
            Section::KeyInformation,
            &ctx.key_information_title(),
            &ctx.entities,
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
}

/// User prompt: numbered history followed by the message being answered.
pub fn sms_user_prompt(history: &[String], current: &str) -> String {
    let numbered = history
        .iter()
        .enumerate()
        .map(|(i, line)| format!("Message {}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{numbered}\n\nCurrent message: {current}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::store::Profile;
    use chrono::TimeZone;

    #[test]
    fn system_prompt_has_clock_and_facts() {
        let mut ctx = ProfileContext::empty(Profile {
            id: "p1".into(),
            first_name: "Ada".into(),
            last_name: String::new(),
            email: None,
            phone: "+15555550100".into(),
            timezone: "Europe/London".into(),
            created_at: Utc::now(),
        });
        ctx.entities = vec!["Prefers mornings.".into()];
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap();
        let prompt = sms_system_prompt(&ctx, &PersonaConfig::default(), now);
        assert_eq!(
            prompt.sections(),
            vec![Section::Personality, Section::DateTime, Section::KeyInformation]
        );
        let text = prompt.build();
        assert!(text.starts_with("You are Maximo, an experienced AI executive coach."));
        assert!(text.contains("Today is 2024-01-10 at 09:30:00. User's timezone is Europe/London."));
    }

    #[test]
    fn user_prompt_numbers_history() {
        let prompt = sms_user_prompt(
            &["[SMS] User: hi".to_owned(), "[SMS] Assistant: hello".to_owned()],
            "[SMS] User: how do I delegate?",
        );
        assert_eq!(
            prompt,
            "Message 1: [SMS] User: hi\n\nMessage 2: [SMS] Assistant: hello\n\n\
             Current message: [SMS] User: how do I delegate?"
        );
    }
}
