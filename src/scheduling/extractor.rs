//! LLM-backed extraction of the next call slot from a transcript or an SMS.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::resolve::{ResolvedDate, resolve_future_date, resolve_relative_date};
use super::timezone::{local_now, parse_timezone, scheduled_start};
use super::validate::{Extraction, SchedulingReply, validate_reply};
use crate::config::{PersonaConfig, SchedulingConfig};
use crate::llm::json::parse_json_object;
use crate::llm::{GenerationRequest, Providers, generate_or_none};
use crate::prompt::render_transcript;
use crate::store::{ScheduledCall, Speaker, TranscriptTurn};

const SYSTEM_PROMPT: &str = "You are an AI assistant that extracts scheduling information from \
conversations. You must respond with valid JSON that matches the specified schema.";

/// Trailing user turns scanned for relative day phrases.
const RESOLVE_WINDOW: usize = 6;

/// A transcript turn only counts toward date resolution when it talks about
/// booking the next call.
const SCHEDULING_WORDS: &[&str] = &[
    "call", "talk", "speak", "chat", "schedule", "reschedule", "session", "appointment", "book",
];

fn mentions_scheduling(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .any(|w| SCHEDULING_WORDS.contains(&w))
}

const DATE_RULES: &str = "RULES FOR INTERPRETING DATES:
- When interpreting relative dates like \"next Wednesday\" or \"this Friday\", use the current date above as reference.
- \"This [day]\" refers to the upcoming occurrence of that day in the current week.
- \"Next [day]\" refers to the occurrence of that day in the following week.
- If today is Wednesday and they say \"next Wednesday\", that would be Wednesday of NEXT week, not today.
- If they mention a date without a year, assume the current year unless it would result in a past date.
- All extracted dates MUST be in the future, not the past.
- When there's no mention of a date assume today's date
- If a time is provided without a day, interpret it as a request to reschedule for today.
- If a time is provided without AM or PM, use your judgement based on the current time to determine if the time is AM or PM.";

const OUTPUT_FORMAT: &str = "Extract the following information in JSON format:
1. scheduled_date: The date of the next call in YYYY-MM-DD format
2. scheduled_time: The time of the next call in HH:MM:SS±HH:MM format (including timezone offset)
3. formatted_date_time: A human-readable representation of the date and time
4. rescheduling: Determine if the scheduling is a rescheduling or a new or next call. Return true for rescheduling and false for new or next call.";

const SCHEDULED_SHAPE: &str = "If scheduling information is found, return:
{
  \"scheduled\": true,
  \"scheduled_date\": \"YYYY-MM-DD\",
  \"scheduled_time\": \"HH:MM:SS±HH:MM\",
  \"formatted_date_time\": \"Human readable date and time\",
  \"rescheduling\": true/false
}";

/// What the extractor reads.
#[derive(Debug, Clone, Copy)]
pub enum SchedulingSource<'a> {
    /// A finished call, with the profile's most recent booking for the
    /// "same time next week" default.
    Transcript {
        turns: &'a [TranscriptTurn],
        last_call: Option<&'a ScheduledCall>,
    },
    /// One inbound text message.
    Message(&'a str),
}

impl SchedulingSource<'_> {
    /// Relative day phrase the user named for the next call. Messages are
    /// read whole; transcripts only through recent user turns that mention
    /// scheduling, and never resolve to the same day.
    fn resolve(&self, today: NaiveDate) -> Option<ResolvedDate> {
        match self {
            Self::Message(text) => resolve_relative_date(text, today),
            Self::Transcript { turns, .. } => {
                let user: Vec<&str> = turns
                    .iter()
                    .filter(|t| t.speaker == Speaker::User)
                    .map(|t| t.text.as_str())
                    .collect();
                let start = user.len().saturating_sub(RESOLVE_WINDOW);
                let text = user[start..]
                    .iter()
                    .copied()
                    .filter(|t| mentions_scheduling(t))
                    .collect::<Vec<_>>()
                    .join(" ");
                resolve_future_date(&text, today)
            }
        }
    }
}

/// Turns conversations into validated call slots.
#[derive(Debug, Clone)]
pub struct SchedulingExtractor {
    providers: Providers,
    persona: PersonaConfig,
    deterministic_dates: bool,
}

impl SchedulingExtractor {
    pub fn new(providers: Providers, persona: PersonaConfig, config: &SchedulingConfig) -> Self {
        Self {
            providers,
            persona,
            deterministic_dates: config.deterministic_dates,
        }
    }

    /// Build the extraction prompt for `source` as seen at `now` in `timezone`.
    pub fn build_prompt(
        &self,
        source: &SchedulingSource<'_>,
        timezone: &str,
        now: DateTime<Utc>,
        resolved: Option<&ResolvedDate>,
    ) -> String {
        let local = local_now(parse_timezone(timezone), now);
        let mut context = vec![
            format!(
                "- Today's date is: {} ({})",
                local.format("%Y-%m-%d"),
                local.format("%A")
            ),
            format!("- Current time is: {}", local.format("%H:%M:%S")),
            format!("- Current year is: {}", local.year()),
            format!("- The user's timezone is: {timezone}"),
        ];
        if let SchedulingSource::Transcript {
            last_call: Some(last),
            ..
        } = source
        {
            context.push(format!(
                "- The last scheduled call was on: {} at {}",
                last.date, last.time
            ));
        }
        if let Some(resolved) = resolved {
            context.push(format!(
                "- \"{}\" refers to {} ({})",
                resolved.phrase,
                resolved.date.format("%Y-%m-%d"),
                resolved.date.format("%A")
            ));
        }
        let context = context.join("\n");

        let PersonaConfig {
            coach_name: coach,
            coach_short_name: short,
            assistant_name: assistant,
            ..
        } = &self.persona;

        match source {
            SchedulingSource::Transcript { turns, .. } => format!(
                "You are an AI assistant analyzing a conversation between an executive coach ({short}) and a client.
The conversation may sometimes involve {coach}'s assistant ({assistant}) picking up the phone and confirming or reminding the client about a scheduled appointment. Your task is to extract scheduling information based on the conversation. If the conversation with {coach} doesn't include any scheduling information, the scheduling info should be next week at the same day and time as the last scheduled call. If {assistant} is just confirming an already scheduled call or reminding the client of an existing appointment, do not interpret it as scheduling a new session or rescheduling.

IMPORTANT CONTEXT:
{context}

{DATE_RULES}
- If this conversation is with the assistant {assistant}, only extract scheduling information if the user explicitly agrees to a new appointment or requests to schedule one.
- If {assistant} is simply confirming an existing appointment or reminding the client, do not extract any scheduling information.
- If the last scheduled call was Friday at 10AM, and the current call had no scheduling information, the next call should also be Friday at 10AM.

{OUTPUT_FORMAT}

If {assistant} is just telling the user they already have a scheduled call, return:
{{ \"scheduled\": false, \"reason\": \"explanation of why no scheduling information was found\" }}

{SCHEDULED_SHAPE}

Conversation:
{}",
                render_transcript(turns, coach)
            ),
            SchedulingSource::Message(text) => format!(
                "You are an AI assistant analyzing a conversation between an executive coach ({short}) and a client.
Your task is to extract the date and time when the client and coach agreed to schedule their next call.

IMPORTANT CONTEXT:
{context}

{DATE_RULES}

{OUTPUT_FORMAT}

If no scheduling information is found, return:
{{ \"scheduled\": false, \"reason\": \"explanation of why no scheduling information was found\" }}

{SCHEDULED_SHAPE}

Message:
{text}"
            ),
        }
    }

    /// Extract a call slot. `None` means the providers failed or returned
    /// something unparseable; a parsed "not scheduled" answer is
    /// [`Extraction::NotScheduled`].
    pub async fn extract(
        &self,
        source: SchedulingSource<'_>,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Option<Extraction> {
        let today = local_now(parse_timezone(timezone), now).date_naive();
        let resolved = if self.deterministic_dates {
            source.resolve(today)
        } else {
            None
        };

        let request = GenerationRequest::new(
            SYSTEM_PROMPT,
            self.build_prompt(&source, timezone, now, resolved.as_ref()),
        )
        .with_temperature(0.0)
        .with_max_tokens(1000)
        .json();

        let raw = generate_or_none(self.providers.structured(), &request, "scheduling").await?;
        let reply: SchedulingReply = match parse_json_object(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "scheduling reply was not valid JSON");
                return None;
            }
        };

        let extraction = validate_reply(reply);
        let Extraction::Scheduled(decision) = extraction else {
            return Some(extraction);
        };
        match resolved {
            Some(resolved) if resolved.date != decision.date => {
                let moved = decision.clone().with_date(resolved.date);
                let ahead = scheduled_start(moved.date, &moved.time)
                    .is_some_and(|start| start.with_timezone(&Utc) > now);
                if !ahead {
                    tracing::warn!(
                        phrase = %resolved.phrase,
                        resolved_date = %resolved.date,
                        time = %moved.time,
                        "resolved phrase lands in the past, keeping provider date"
                    );
                    return Some(Extraction::Scheduled(decision));
                }
                tracing::info!(
                    phrase = %resolved.phrase,
                    provider_date = %decision.date,
                    resolved_date = %resolved.date,
                    "overriding provider date with resolved phrase"
                );
                Some(Extraction::Scheduled(moved))
            }
            _ => {
                tracing::info!(
                    date = %decision.date,
                    time = %decision.time,
                    rescheduling = decision.rescheduling,
                    "extracted scheduling information"
                );
                Some(Extraction::Scheduled(decision))
            }
        }
    }
}
