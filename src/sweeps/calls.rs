//! Sweeps over booked calls: morning reminder, call-time ring and no-show.

use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};

use super::Sweeper;
use crate::notify::messages::{daily_reminder, missed_call, ready_for_call};
use crate::scheduling::timezone::{local_now, minutes_since, parse_timezone};
use crate::store::{ConversationType, Profile, ScheduledCall, StoreResult};

/// `HH:MM` of a stored `HH:MM:SS±HH:MM` time.
pub fn clock_of(time: &str) -> &str {
    time.get(..5).unwrap_or(time)
}

/// UTC dates that can be "today" somewhere.
fn candidate_dates(now: DateTime<Utc>) -> Vec<NaiveDate> {
    let today = now.date_naive();
    [today.checked_sub_days(Days::new(1)), Some(today), today.checked_add_days(Days::new(1))]
        .into_iter()
        .flatten()
        .collect()
}

impl Sweeper {
    /// Booked calls around `now` paired with their profiles.
    pub(super) async fn booked_calls(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(ScheduledCall, Profile)>> {
        let calls = self
            .store
            .scheduled_calls_on_dates(&candidate_dates(now))
            .await?;
        let mut paired = Vec::with_capacity(calls.len());
        for call in calls {
            match self.store.get_profile(&call.profile_id).await? {
                Some(profile) => paired.push((call, profile)),
                None => {
                    tracing::warn!(call_id = %call.id, profile_id = %call.profile_id, "scheduled call without profile");
                }
            }
        }
        Ok(paired)
    }

    /// "We have a call today" at the reminder hour of the call day.
    pub(super) async fn send_daily_reminder(
        &self,
        call: &ScheduledCall,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if call.reminder_sent {
            return Ok(false);
        }
        let local = local_now(parse_timezone(&profile.timezone), now);
        if local.date_naive() != call.date || local.hour() != self.config.reminder_hour {
            return Ok(false);
        }

        let body = daily_reminder(&profile.first_name, clock_of(&call.time));
        if let Err(e) = self
            .notifier
            .send_sms(&profile.phone, &body, Some(&profile.id))
            .await
        {
            tracing::error!(call_id = %call.id, error = %e, "daily reminder not sent");
            return Ok(false);
        }
        self.store.mark_reminder_sent(&call.id).await?;
        tracing::info!(call_id = %call.id, profile_id = %profile.id, "daily reminder sent");
        Ok(true)
    }

    /// At call time, text "I'm ready" and ring the client shortly after,
    /// unless a coaching call already happened that day.
    pub(super) async fn ring_on_time(
        &self,
        call: &ScheduledCall,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(minutes) = minutes_since(call.date, &call.time, now) else {
            tracing::warn!(call_id = %call.id, time = %call.time, "unparseable scheduled time");
            return Ok(false);
        };
        if minutes.abs() > self.config.call_window_minutes || self.rung.contains_key(&call.id) {
            return Ok(false);
        }
        let coached = self
            .store
            .conversations_on_date(&profile.id, call.date)
            .await?
            .iter()
            .any(|c| c.kind == ConversationType::ScheduledCoach);
        if coached {
            tracing::debug!(call_id = %call.id, "coaching call already happened today");
            return Ok(false);
        }
        if self.rung.insert(call.id.clone(), call.date).is_some() {
            return Ok(false);
        }

        if let Err(e) = self
            .notifier
            .send_sms(&profile.phone, &ready_for_call(&profile.first_name), Some(&profile.id))
            .await
        {
            tracing::error!(call_id = %call.id, error = %e, "call-time text not sent");
        }
        self.dial_later(profile.phone.clone());
        Ok(true)
    }

    /// Flag a call nobody picked up once it is well past its start.
    pub(super) async fn flag_no_show(
        &self,
        call: &ScheduledCall,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if call.no_show {
            return Ok(false);
        }
        let Some(minutes) = minutes_since(call.date, &call.time, now) else {
            return Ok(false);
        };
        if minutes < self.config.no_show_minutes {
            return Ok(false);
        }
        let answered = self
            .store
            .conversations_on_date(&profile.id, call.date)
            .await?
            .iter()
            .any(|c| !c.voicemail);
        if answered {
            return Ok(false);
        }

        self.store.mark_no_show(&call.id).await?;
        tracing::info!(
            call_id = %call.id,
            profile_id = %profile.id,
            "scheduled call missed"
        );
        let body = missed_call(&profile.first_name, clock_of(&call.time));
        if let Err(e) = self
            .notifier
            .send_sms(&profile.phone, &body, Some(&profile.id))
            .await
        {
            tracing::error!(call_id = %call.id, error = %e, "missed-call text not sent");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clock_drops_seconds_and_offset() {
        assert_eq!(clock_of("15:30:00-05:00"), "15:30");
        assert_eq!(clock_of("9"), "9");
    }

    #[test]
    fn dates_cover_every_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 1, 0, 0).unwrap();
        assert_eq!(
            candidate_dates(now),
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 19).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
            ]
        );
    }
}
