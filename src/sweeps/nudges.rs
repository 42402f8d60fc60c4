//! Nudges for clients who signed up but never took a call.

use std::collections::HashSet;

use chrono::{DateTime, Timelike, Utc};

use super::Sweeper;
use crate::notify::messages::inactivity_nudge;
use crate::scheduling::timezone::{local_now, parse_timezone};
use crate::store::{Profile, StoreResult};

/// Minutes past the reminder hour in which a nudge may still go out.
const NUDGE_WINDOW_MINUTES: u32 = 3;

/// Whole days between signup and `now`, counted in the client's timezone.
pub fn days_since_signup(profile: &Profile, now: DateTime<Utc>) -> i64 {
    let tz = parse_timezone(&profile.timezone);
    (local_now(tz, now) - local_now(tz, profile.created_at)).num_days()
}

impl Sweeper {
    /// Profiles with no conversation at all.
    pub(super) async fn inactive_profiles(&self) -> StoreResult<Vec<Profile>> {
        let active: HashSet<String> = self
            .store
            .profile_ids_with_conversations()
            .await?
            .into_iter()
            .collect();
        Ok(self
            .store
            .list_profiles()
            .await?
            .into_iter()
            .filter(|p| !active.contains(&p.id))
            .collect())
    }

    /// Send today's nudge if `profile` is on a nudge day and it is just
    /// past the reminder hour locally.
    pub(super) async fn nudge(&self, profile: &Profile, now: DateTime<Utc>) -> bool {
        let local = local_now(parse_timezone(&profile.timezone), now);
        if local.hour() != self.config.reminder_hour || local.minute() >= NUDGE_WINDOW_MINUTES {
            return false;
        }
        let day = days_since_signup(profile, now);
        if !self.config.nudge_days.contains(&day) {
            return false;
        }
        let Some(body) = inactivity_nudge(day, &profile.first_name) else {
            return false;
        };
        if self
            .nudged
            .insert((profile.id.clone(), day), now.date_naive())
            .is_some()
        {
            return false;
        }

        match self
            .notifier
            .send_sms(&profile.phone, &body, Some(&profile.id))
            .await
        {
            Ok(_) => {
                tracing::info!(profile_id = %profile.id, day, "inactivity nudge sent");
                true
            }
            Err(e) => {
                tracing::error!(profile_id = %profile.id, day, error = %e, "inactivity nudge not sent");
                false
            }
        }
    }
}
