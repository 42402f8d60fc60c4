//! Persisting extracted slots: store, invite, reconcile, confirm.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::extractor::{SchedulingExtractor, SchedulingSource};
use super::reconcile::reconcile_scheduled_calls;
use super::validate::{Extraction, ScheduleDecision};
use crate::error::Result;
use crate::notify::Notifier;
use crate::notify::messages::{INVITE_SENT, SCHEDULING_NOT_UNDERSTOOD, scheduled_confirmation};
use crate::store::{NewScheduledCall, Profile, RecordStore, ScheduledCall, TranscriptTurn};

/// Which confirmation text follows a successful booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Booked during a coaching call: "I just emailed you a calendar invite".
    InviteNotice,
    /// Booked elsewhere: repeats the slot back to the client.
    Slot,
}

/// Runs extraction and applies the result.
pub struct SchedulingService {
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    extractor: SchedulingExtractor,
    confirmation_delay: Duration,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<Notifier>,
        extractor: SchedulingExtractor,
        confirmation_delay: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            extractor,
            confirmation_delay,
        }
    }

    /// Post-call scheduling from a transcript. `is_scheduled` selects the
    /// confirmation text.
    pub async fn handle_scheduling(
        &self,
        profile: &Profile,
        turns: &[TranscriptTurn],
        is_scheduled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledCall>> {
        if turns.is_empty() {
            tracing::warn!(profile_id = %profile.id, "no transcript for scheduling");
            return Ok(None);
        }
        let last_call = self
            .store
            .list_scheduled_calls(&profile.id)
            .await?
            .into_iter()
            .next();

        let source = SchedulingSource::Transcript {
            turns,
            last_call: last_call.as_ref(),
        };
        let Some(Extraction::Scheduled(decision)) =
            self.extractor.extract(source, &profile.timezone, now).await
        else {
            tracing::info!(profile_id = %profile.id, "no scheduling information in call");
            return Ok(None);
        };

        let confirmation = if is_scheduled {
            Confirmation::InviteNotice
        } else {
            Confirmation::Slot
        };
        self.apply(profile, &decision, confirmation).await.map(Some)
    }

    /// Scheduling from one SMS. A reply that names no usable slot gets a
    /// request for an explicit date and time. Returns whether a call was
    /// booked.
    pub async fn handle_sms_scheduling(
        &self,
        profile: &Profile,
        message: &str,
        is_rescheduling: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let extraction = self
            .extractor
            .extract(SchedulingSource::Message(message), &profile.timezone, now)
            .await;
        match extraction {
            Some(Extraction::Scheduled(decision)) => {
                let confirmation = if is_rescheduling {
                    Confirmation::Slot
                } else {
                    Confirmation::InviteNotice
                };
                self.apply(profile, &decision, confirmation).await?;
                Ok(true)
            }
            Some(Extraction::NotScheduled { .. }) => {
                self.notifier
                    .send_sms(&profile.phone, SCHEDULING_NOT_UNDERSTOOD, Some(&profile.id))
                    .await?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Store the slot, send the invitation, drop older bookings and queue
    /// the confirmation SMS.
    pub async fn apply(
        &self,
        profile: &Profile,
        decision: &ScheduleDecision,
        confirmation: Confirmation,
    ) -> Result<ScheduledCall> {
        let previous_uid = self
            .store
            .list_scheduled_calls(&profile.id)
            .await?
            .into_iter()
            .find_map(|c| c.event_uid);

        let call = self
            .store
            .insert_scheduled_call(&NewScheduledCall {
                profile_id: profile.id.clone(),
                date: decision.date,
                time: decision.time.clone(),
            })
            .await?;
        tracing::info!(
            profile_id = %profile.id,
            call_id = %call.id,
            date = %call.date,
            time = %call.time,
            "stored scheduled call"
        );

        let invite = self
            .notifier
            .send_calendar_invitation(
                profile,
                &call,
                decision.rescheduling,
                previous_uid.as_deref(),
            )
            .await;
        let invite_sent = match invite {
            Ok(uid) => {
                if let Err(e) = self.store.mark_invite_sent(&call.id, &uid).await {
                    tracing::warn!(call_id = %call.id, error = %e, "could not flag invitation as sent");
                }
                true
            }
            Err(e) => {
                tracing::warn!(profile_id = %profile.id, error = %e, "calendar invitation not sent");
                false
            }
        };

        if let Err(e) = reconcile_scheduled_calls(self.store.as_ref(), &profile.id).await {
            tracing::warn!(profile_id = %profile.id, error = %e, "scheduled call cleanup failed");
        }

        if invite_sent {
            let body = match confirmation {
                Confirmation::InviteNotice => INVITE_SENT.to_owned(),
                Confirmation::Slot => {
                    scheduled_confirmation(&profile.first_name, &decision.formatted_date_time)
                }
            };
            self.notifier.send_sms_later(
                self.confirmation_delay,
                profile.phone.clone(),
                body,
                Some(profile.id.clone()),
            );
        }
        Ok(call)
    }
}

impl std::fmt::Debug for SchedulingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingService")
            .field("confirmation_delay", &self.confirmation_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{PersonaConfig, SchedulingConfig};
    use crate::test_utils::{
        FakeMailer, FakeTelephony, ScriptedProvider, providers, store_with_profile, transcript,
    };
    use chrono::{NaiveDate, TimeZone};

    struct Harness {
        service: SchedulingService,
        store: Arc<crate::store::SqliteRecordStore>,
        telephony: Arc<FakeTelephony>,
        mailer: Arc<FakeMailer>,
        profile: Profile,
    }

    async fn harness(email: Option<&str>, reply: &str) -> Harness {
        let (store, profile) = store_with_profile(email).await;
        let telephony = Arc::new(FakeTelephony::default());
        let mailer = Arc::new(FakeMailer::default());
        let notifier = Arc::new(Notifier::new(
            telephony.clone(),
            store.clone(),
            mailer.clone(),
            PersonaConfig::default(),
            "team@meetmaximo.com",
        ));
        let extractor = SchedulingExtractor::new(
            providers(
                ScriptedProvider::failing("anthropic"),
                ScriptedProvider::always("openai", reply),
            ),
            PersonaConfig::default(),
            &SchedulingConfig::default(),
        );
        Harness {
            service: SchedulingService::new(store.clone(), notifier, extractor, Duration::ZERO),
            store,
            telephony,
            mailer,
            profile,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 14, 0, 0).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    const FRIDAY: &str = r#"{"scheduled": true, "scheduled_date": "2024-03-22",
        "scheduled_time": "10:00:00-04:00", "formatted_date_time": "March 22 at 10:00 AM",
        "rescheduling": false}"#;

    const FRIDAY_RESCHEDULE: &str = r#"{"scheduled": true, "scheduled_date": "2024-03-22",
        "scheduled_time": "10:00:00-04:00", "formatted_date_time": "March 22 at 10:00 AM",
        "rescheduling": true}"#;

    #[tokio::test]
    async fn call_booking_invites_and_confirms() {
        let h = harness(Some("ada@example.com"), FRIDAY).await;
        let turns = transcript(&["Friday at ten?", "Friday at 10 works"]);

        let call = h
            .service
            .handle_scheduling(&h.profile, &turns, true, now())
            .await
            .unwrap()
            .unwrap();
        settle().await;

        let stored = h.store.list_scheduled_calls(&h.profile.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, call.id);
        assert!(stored[0].calendar_invite_sent);
        assert_eq!(h.mailer.sent().len(), 1);
        assert_eq!(h.telephony.sms_bodies(), vec![INVITE_SENT.to_owned()]);
    }

    #[tokio::test]
    async fn sms_reschedule_replaces_booking_and_reuses_uid() {
        let h = harness(Some("ada@example.com"), FRIDAY_RESCHEDULE).await;
        let decision = ScheduleDecision {
            date: NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
            time: "09:00:00-04:00".into(),
            formatted_date_time: "March 21 at 9:00 AM".into(),
            rescheduling: false,
        };
        let first = h
            .service
            .apply(&h.profile, &decision, Confirmation::InviteNotice)
            .await
            .unwrap();

        let booked = h
            .service
            .handle_sms_scheduling(&h.profile, "can we move it to friday at 10?", true, now())
            .await
            .unwrap();
        assert!(booked);
        settle().await;

        let stored = h.store.list_scheduled_calls(&h.profile.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].id, first.id);
        assert_eq!(
            stored[0].event_uid.as_deref(),
            Some(format!("{}@coachline", first.id).as_str())
        );
        assert!(h.telephony.sms_bodies().contains(&scheduled_confirmation(
            "Ada",
            "March 22 at 10:00 AM"
        )));
    }

    #[tokio::test]
    async fn unclear_sms_asks_again() {
        let h = harness(
            Some("ada@example.com"),
            r#"{"scheduled": false, "reason": "no time given"}"#,
        )
        .await;
        let booked = h
            .service
            .handle_sms_scheduling(&h.profile, "sometime soon", true, now())
            .await
            .unwrap();
        assert!(!booked);
        assert_eq!(h.telephony.sms_bodies(), vec![SCHEDULING_NOT_UNDERSTOOD.to_owned()]);
        assert!(h.store.list_scheduled_calls(&h.profile.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_email_stores_without_confirmation() {
        let h = harness(None, FRIDAY).await;
        let turns = transcript(&["Friday at ten?", "Sure"]);
        h.service
            .handle_scheduling(&h.profile, &turns, true, now())
            .await
            .unwrap()
            .unwrap();
        settle().await;

        let stored = h.store.list_scheduled_calls(&h.profile.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].calendar_invite_sent);
        assert!(h.telephony.sent_sms().is_empty());
    }
}
