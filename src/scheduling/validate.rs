//! Validation of model-produced scheduling replies.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::timezone::{format_for_humans, scheduled_start};

static DATE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok());
static TIME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2}$").ok());

fn matches(re: &LazyLock<Option<Regex>>, value: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(value))
}

/// The JSON shape the extraction prompt asks for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulingReply {
    pub scheduled: bool,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub formatted_date_time: Option<String>,
    pub rescheduling: Option<bool>,
    pub reason: Option<String>,
}

/// A validated call slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDecision {
    pub date: NaiveDate,
    /// `HH:MM:SS±HH:MM`.
    pub time: String,
    pub formatted_date_time: String,
    pub rescheduling: bool,
}

impl ScheduleDecision {
    /// Move to another date, keeping the time and re-deriving the human form.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        if let Some(start) = scheduled_start(date, &self.time) {
            self.formatted_date_time = format_for_humans(start);
        }
        self
    }
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Scheduled(ScheduleDecision),
    /// Nothing schedulable; carries the reason for logs.
    NotScheduled { reason: String },
}

impl Extraction {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    pub fn decision(&self) -> Option<&ScheduleDecision> {
        match self {
            Self::Scheduled(decision) => Some(decision),
            Self::NotScheduled { .. } => None,
        }
    }
}

/// Check formats and that the combined timestamp parses.
pub fn validate_reply(reply: SchedulingReply) -> Extraction {
    let not = |reason: String| {
        tracing::info!(reason = %reason, "no usable scheduling information");
        Extraction::NotScheduled { reason }
    };

    if !reply.scheduled {
        return not(reply.reason.unwrap_or_else(|| "nothing scheduled".to_owned()));
    }
    let (Some(date), Some(time)) = (reply.scheduled_date, reply.scheduled_time) else {
        return not("incomplete scheduling information".to_owned());
    };
    let (date, time) = (date.trim().to_owned(), time.trim().to_owned());
    if !matches(&DATE_RE, &date) {
        return not(format!("invalid date format: {date}"));
    }
    if !matches(&TIME_RE, &time) {
        return not(format!("invalid time format: {time}"));
    }
    let Ok(parsed_date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
        return not(format!("invalid date: {date}"));
    };
    let Some(start) = scheduled_start(parsed_date, &time) else {
        return not(format!("invalid date/time combination: {date} {time}"));
    };

    let formatted_date_time = reply
        .formatted_date_time
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| format_for_humans(start));

    Extraction::Scheduled(ScheduleDecision {
        date: parsed_date,
        time,
        formatted_date_time,
        rescheduling: reply.rescheduling.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn reply(date: &str, time: &str) -> SchedulingReply {
        SchedulingReply {
            scheduled: true,
            scheduled_date: Some(date.into()),
            scheduled_time: Some(time.into()),
            formatted_date_time: Some("Thursday at 3 PM".into()),
            rescheduling: Some(true),
            reason: None,
        }
    }

    #[test]
    fn well_formed_reply_is_accepted() {
        let out = validate_reply(reply("2024-03-21", "15:00:00-04:00"));
        let decision = out.decision().unwrap();
        assert_eq!(decision.date, NaiveDate::from_ymd_opt(2024, 3, 21).unwrap());
        assert_eq!(decision.time, "15:00:00-04:00");
        assert!(decision.rescheduling);
    }

    #[test]
    fn malformed_fields_are_rejected() {
        for (date, time) in [
            ("2024-3-21", "15:00:00-04:00"),
            ("2024-03-21", "15:00-04:00"),
            ("2024-03-21", "3pm"),
            ("2024-02-30", "15:00:00-04:00"),
            ("2024-03-21", "25:00:00-04:00"),
        ] {
            assert!(!validate_reply(reply(date, time)).is_success(), "{date} {time}");
        }
    }

    #[test]
    fn unscheduled_reply_keeps_reason() {
        let out = validate_reply(SchedulingReply {
            reason: Some("just a reminder".into()),
            ..SchedulingReply::default()
        });
        assert_eq!(
            out,
            Extraction::NotScheduled {
                reason: "just a reminder".into()
            }
        );
    }

    #[test]
    fn missing_human_form_is_derived() {
        let mut r = reply("2024-03-19", "18:00:00-04:00");
        r.formatted_date_time = None;
        let out = validate_reply(r);
        assert_eq!(out.decision().unwrap().formatted_date_time, "March 19 at 6:00 PM");
    }

    #[test]
    fn moving_date_rewrites_human_form() {
        let decision = validate_reply(reply("2024-03-19", "18:00:00-04:00"))
            .decision()
            .cloned()
            .unwrap()
            .with_date(NaiveDate::from_ymd_opt(2024, 3, 21).unwrap());
        assert_eq!(decision.formatted_date_time, "March 21 at 6:00 PM");
    }
}
