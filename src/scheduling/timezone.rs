//! Timezone helpers for profile-local scheduling.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA zone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            if !name.trim().is_empty() {
                tracing::warn!(timezone = name, "unknown timezone, using UTC");
            }
            Tz::UTC
        }
    }
}

/// Current offset of `tz` at `at`, formatted `±HH:MM`.
pub fn offset_string(tz: Tz, at: DateTime<Utc>) -> String {
    let seconds = tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc();
    format_offset(seconds)
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.unsigned_abs() / 60;
    format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Combine a stored date with a `HH:MM:SS±HH:MM` time.
pub fn scheduled_start(date: NaiveDate, time: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(&format!("{}T{}", date.format("%Y-%m-%d"), time.trim())).ok()
}

/// Minutes elapsed since the scheduled start; negative while still ahead.
pub fn minutes_since(date: NaiveDate, time: &str, now: DateTime<Utc>) -> Option<i64> {
    let start = scheduled_start(date, time)?;
    Some((now - start.with_timezone(&Utc)).num_minutes())
}

/// `now` as wall-clock time in `tz`.
pub fn local_now(tz: Tz, now: DateTime<Utc>) -> DateTime<Tz> {
    now.with_timezone(&tz)
}

/// Human form used in SMS copy, e.g. `March 19 at 6:00 PM`.
pub fn format_for_humans(start: DateTime<FixedOffset>) -> String {
    start.format("%B %-d at %-I:%M %p").to_string()
}

/// Clock time only, e.g. `6:00 PM`, in `tz`.
pub fn format_clock(start: DateTime<FixedOffset>, tz: Tz) -> String {
    start.with_timezone(&tz).format("%-I:%M %p").to_string()
}
