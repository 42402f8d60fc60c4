//! Deterministic resolution of relative day phrases.
//!
//! Weeks start on Monday. "this <weekday>" is the next occurrence within
//! the coming seven days (today included); "next <weekday>" is that weekday
//! in the following calendar week; a bare weekday means "this". Weekday
//! phrases take precedence over "today"/"tomorrow", and within each group
//! the last mention wins. Call transcripts only resolve weekday phrases and
//! "tomorrow"; "today" there is usually small talk.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// A relative phrase and the date it denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub phrase: String,
}

fn weekday(word: &str) -> Option<Weekday> {
    Some(match word {
        "monday" => Weekday::Mon,
        "tuesday" | "tues" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" | "thurs" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    })
}

/// The next `target` on or after `today`.
pub fn this_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let ahead = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    today + Duration::days(i64::from(ahead))
}

/// `target` in the calendar week after the one containing `today`.
pub fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    monday + Duration::days(7 + i64::from(target.num_days_from_monday()))
}

/// Resolve the relative day phrase in `text`, if any.
pub fn resolve_relative_date(text: &str, today: NaiveDate) -> Option<ResolvedDate> {
    resolve(text, today, true)
}

/// Like [`resolve_relative_date`] but ignoring "today" and "tonight".
pub fn resolve_future_date(text: &str, today: NaiveDate) -> Option<ResolvedDate> {
    resolve(text, today, false)
}

fn resolve(text: &str, today: NaiveDate, same_day: bool) -> Option<ResolvedDate> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let mut by_weekday: Option<ResolvedDate> = None;
    let mut by_day_word: Option<ResolvedDate> = None;

    for (i, word) in words.iter().enumerate() {
        match *word {
            "today" | "tonight" if same_day => {
                by_day_word = Some(ResolvedDate {
                    date: today,
                    phrase: (*word).to_owned(),
                });
            }
            "tomorrow" => {
                by_day_word = Some(ResolvedDate {
                    date: today + Duration::days(1),
                    phrase: (*word).to_owned(),
                });
            }
            w => {
                let Some(target) = weekday(w) else { continue };
                let modifier = i.checked_sub(1).map(|j| words[j]);
                let (date, phrase) = match modifier {
                    Some("next") => (next_weekday(today, target), format!("next {w}")),
                    Some("this") => (this_weekday(today, target), format!("this {w}")),
                    _ => (this_weekday(today, target), w.to_owned()),
                };
                by_weekday = Some(ResolvedDate { date, phrase });
            }
        }
    }

    by_weekday.or(by_day_word)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    // 2024-03-20 is a Wednesday.
    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    fn ymd(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn this_and_next_weekday() {
        let today = wednesday();
        assert_eq!(resolve_relative_date("this Friday at 3", today).unwrap().date, ymd(22));
        assert_eq!(resolve_relative_date("next Friday at 3", today).unwrap().date, ymd(29));
        assert_eq!(resolve_relative_date("next wednesday", today).unwrap().date, ymd(27));
        assert_eq!(resolve_relative_date("this Wednesday", today).unwrap().date, today);
        assert_eq!(resolve_relative_date("Monday works", today).unwrap().date, ymd(25));
    }

    #[test]
    fn next_sunday_is_in_the_following_week() {
        let saturday = ymd(23);
        assert_eq!(resolve_relative_date("this sunday", saturday).unwrap().date, ymd(24));
        assert_eq!(resolve_relative_date("next sunday", saturday).unwrap().date, ymd(31));
    }

    #[test]
    fn today_and_tomorrow() {
        let today = wednesday();
        assert_eq!(resolve_relative_date("call me tomorrow", today).unwrap().date, ymd(21));
        assert_eq!(resolve_relative_date("later today?", today).unwrap().date, today);
    }

    #[test]
    fn weekday_beats_day_words_and_last_mention_wins() {
        let today = wednesday();
        let resolved =
            resolve_relative_date("How was today? Let's do next Monday, no, next Tuesday", today)
                .unwrap();
        assert_eq!(resolved.date, ymd(26));
        assert_eq!(resolved.phrase, "next tuesday");
    }

    #[test]
    fn future_only_skips_same_day_words() {
        let today = wednesday();
        assert!(resolve_future_date("today was rough", today).is_none());
        assert_eq!(resolve_future_date("tomorrow then", today).unwrap().date, ymd(21));
        assert_eq!(resolve_future_date("today? no, friday", today).unwrap().date, ymd(22));
    }

    #[test]
    fn next_thursday_from_new_years_day() {
        // Monday 2024-01-01.
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let resolved = resolve_relative_date("Let's do next Thursday at 3pm", monday).unwrap();
        assert_eq!(resolved.date, NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
        assert_eq!(resolved.phrase, "next thursday");
        assert_eq!(
            resolve_relative_date("this Thursday at 3pm", monday).unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn no_phrase_no_resolution() {
        assert!(resolve_relative_date("Reschedule to March 17th at 10:00 AM", wednesday()).is_none());
        assert!(resolve_relative_date("", wednesday()).is_none());
    }
}
