//! Calendar invitations (iCalendar `METHOD:REQUEST`).

use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;

use super::mail::{Attachment, Email};

const CALL_MINUTES: i64 = 30;

/// Content lines longer than this many octets are folded.
const FOLD_OCTETS: usize = 75;

/// One invitation to a coaching call.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    /// Stable UID; reschedules reuse it so clients update the event.
    pub uid: String,
    /// Increases with every update of the same UID.
    pub sequence: u32,
    pub title: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub attendee_name: String,
    pub attendee_email: String,
    pub organizer_name: String,
    pub organizer_email: String,
}

impl CalendarEvent {
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(CALL_MINUTES)
    }

    /// Render as an `.ics` document.
    pub fn to_ics(&self, stamp: DateTime<Utc>) -> String {
        let utc = |at: DateTime<FixedOffset>| at.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ");
        let lines = [
            "BEGIN:VCALENDAR".to_owned(),
            "VERSION:2.0".to_owned(),
            "PRODID:-//coachline//calendar//EN".to_owned(),
            "METHOD:REQUEST".to_owned(),
            "BEGIN:VEVENT".to_owned(),
            format!("UID:{}", escape(&self.uid)),
            format!("SEQUENCE:{}", self.sequence),
            format!("DTSTAMP:{}", stamp.format("%Y%m%dT%H%M%SZ")),
            format!("DTSTART:{}", utc(self.start)),
            format!("DTEND:{}", utc(self.end())),
            format!("SUMMARY:{}", escape(&self.title)),
            format!("DESCRIPTION:{}", escape(&self.description)),
            "LOCATION:Phone Call".to_owned(),
            "STATUS:CONFIRMED".to_owned(),
            "TRANSP:OPAQUE".to_owned(),
            format!(
                "ORGANIZER;CN={}:mailto:{}",
                escape(&self.organizer_name),
                self.organizer_email
            ),
            format!(
                "ATTENDEE;CN={};RSVP=TRUE;PARTSTAT=NEEDS-ACTION;ROLE=REQ-PARTICIPANT:mailto:{}",
                escape(&self.attendee_name),
                self.attendee_email
            ),
            format!(
                "ATTENDEE;CN={};RSVP=TRUE;PARTSTAT=ACCEPTED;ROLE=CHAIR:mailto:{}",
                escape(&self.organizer_name),
                self.organizer_email
            ),
            "END:VEVENT".to_owned(),
            "END:VCALENDAR".to_owned(),
        ];
        let mut out = String::new();
        for line in &lines {
            out.push_str(&fold(line));
            out.push_str("\r\n");
        }
        out
    }

    /// Invitation email with the `.ics` attached. `tz` only affects how the
    /// time is shown in the subject and body.
    pub fn to_email(&self, tz: Tz, rescheduling: bool, stamp: DateTime<Utc>) -> Email {
        let local_start = self.start.with_timezone(&tz);
        let local_end = self.end().with_timezone(&tz);
        let date = local_start.format("%a %b %-d, %Y").to_string();
        let start = local_start.format("%-I:%M %p").to_string();
        let end = local_end.format("%-I:%M %p").to_string();
        let zone = local_start.format("%Z").to_string();

        let (prefix, verb) = if rescheduling {
            ("UPDATED INVITATION", "rescheduled")
        } else {
            ("INVITATION", "scheduled")
        };
        let subject = format!("{prefix}: {} @ {date} {start} - {end} {zone}", self.title);
        let sentence = format!(
            "Your {} is {verb} for {date} at {start} {zone}.",
            lowercase_first(&self.title)
        );
        let text = format!(
            "Hi {},\n\n{sentence}\n\nBest regards,\n{}",
            self.attendee_name, self.organizer_name
        );
        let html = format!(
            "<p>Hi {},</p><p>{}</p><p>Best regards,<br>{}</p>",
            escape_html(&self.attendee_name),
            escape_html(&sentence),
            escape_html(&self.organizer_name)
        );

        Email {
            to: self.attendee_email.clone(),
            subject,
            text,
            html: Some(html),
            attachments: vec![Attachment {
                filename: "invitation.ics".to_owned(),
                content_type: "text/calendar; method=REQUEST".to_owned(),
                content: self.to_ics(stamp).into_bytes(),
            }],
        }
    }
}

fn lowercase_first(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split `line` into 75-octet pieces joined by CRLF + space, never inside a
/// UTF-8 sequence.
fn fold(line: &str) -> String {
    if line.len() <= FOLD_OCTETS {
        return line.to_owned();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_OCTETS * 3);
    let mut used = 0;
    for ch in line.chars() {
        if used + ch.len_utf8() > FOLD_OCTETS {
            // The leading space counts toward the next line's octets.
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(ch);
        used += ch.len_utf8();
    }
    out
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
