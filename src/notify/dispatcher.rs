//! Notification dispatcher: SMS and email side effects.
//!
//! Every outbound SMS goes through [`Notifier::send_sms`], which normalizes
//! the number and logs the message against the profile so later prompts see
//! it in the conversation history.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;

use super::calendar::CalendarEvent;
use super::mail::Mailer;
use super::messages;
use super::phone::normalize_phone_number;
use super::NotifyError;
use crate::config::PersonaConfig;
use crate::scheduling::timezone::{parse_timezone, scheduled_start};
use crate::store::{Profile, RecordStore, ScheduledCall, Sender};
use crate::telephony::Telephony;

/// How a call ended, as far as follow-up messaging is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Ended with a natural goodbye.
    Normal,
    /// Cut off mid-conversation.
    Dropped,
    /// Answered by voicemail.
    Voicemail,
    /// Caller has no profile.
    Unauthorized,
}

/// The SMS a call outcome calls for, if any.
pub fn outcome_message(outcome: CallOutcome, persona: &PersonaConfig) -> Option<String> {
    match outcome {
        CallOutcome::Normal => None,
        CallOutcome::Dropped => Some(messages::random_wellbeing_message().to_owned()),
        CallOutcome::Voicemail => Some(messages::VOICEMAIL_FOLLOWUP.to_owned()),
        CallOutcome::Unauthorized => Some(messages::call_signup_link(persona)),
    }
}

/// Sends SMS and email on behalf of the coach.
pub struct Notifier {
    telephony: Arc<dyn Telephony>,
    store: Arc<dyn RecordStore>,
    mailer: Arc<dyn Mailer>,
    persona: PersonaConfig,
    organizer_email: String,
}

impl Notifier {
    pub fn new(
        telephony: Arc<dyn Telephony>,
        store: Arc<dyn RecordStore>,
        mailer: Arc<dyn Mailer>,
        persona: PersonaConfig,
        organizer_email: &str,
    ) -> Self {
        Self {
            telephony,
            store,
            mailer,
            persona,
            organizer_email: organizer_email.to_owned(),
        }
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Send an SMS and, when the recipient has a profile, log it as sent by
    /// the coach. Returns the telephony message sid.
    pub async fn send_sms(
        &self,
        phone: &str,
        body: &str,
        profile_id: Option<&str>,
    ) -> Result<String, NotifyError> {
        let to = normalize_phone_number(phone)?;
        let sid = self.telephony.send_sms(&to, body).await?;
        tracing::info!(to = %to, message_sid = %sid, "sms sent");

        if let Some(profile_id) = profile_id {
            if let Err(e) = self.store.insert_message(profile_id, body, Sender::Ai).await {
                tracing::warn!(profile_id, error = %e, "sent sms could not be logged");
            }
        }
        Ok(sid)
    }

    /// Send an SMS after `delay` without blocking the caller.
    pub fn send_sms_later(
        self: &Arc<Self>,
        delay: Duration,
        phone: String,
        body: String,
        profile_id: Option<String>,
    ) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = notifier
                .send_sms(&phone, &body, profile_id.as_deref())
                .await
            {
                tracing::error!(phone = %phone, error = %e, "delayed sms failed");
            }
        });
    }

    /// Send whatever follow-up the call outcome calls for.
    pub async fn notify_call_outcome(
        &self,
        outcome: CallOutcome,
        phone: &str,
        profile_id: Option<&str>,
    ) -> Result<(), NotifyError> {
        let Some(body) = outcome_message(outcome, &self.persona) else {
            return Ok(());
        };
        tracing::info!(?outcome, "sending call follow-up");
        self.send_sms(phone, &body, profile_id).await?;
        Ok(())
    }

    /// Email a calendar invitation for `call`. Reschedules reuse
    /// `previous_uid` so the client updates the existing event. Returns the
    /// event UID.
    pub async fn send_calendar_invitation(
        &self,
        profile: &Profile,
        call: &ScheduledCall,
        rescheduling: bool,
        previous_uid: Option<&str>,
    ) -> Result<String, NotifyError> {
        let email = profile
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| NotifyError::MissingEmail(profile.id.clone()))?;
        let start = scheduled_start(call.date, &call.time).ok_or_else(|| {
            NotifyError::InvalidSchedule(format!("{} {}", call.date, call.time))
        })?;
        let tz: Tz = parse_timezone(&profile.timezone);
        let stamp = Utc::now();

        let (uid, sequence) = match previous_uid.filter(|_| rescheduling) {
            // Epoch seconds keep sequence numbers increasing across updates.
            Some(uid) => (
                uid.to_owned(),
                u32::try_from(stamp.timestamp()).unwrap_or(u32::MAX),
            ),
            None => (format!("{}@coachline", call.id), 0),
        };

        let coach = &self.persona.coach_name;
        let event = CalendarEvent {
            uid: uid.clone(),
            sequence,
            title: format!("Call with {coach}"),
            description: format!(
                "Scheduled call with {coach}, your AI executive coach. \
                 Simply call the same number you used previously."
            ),
            start,
            attendee_name: profile.full_name(),
            attendee_email: email.to_owned(),
            organizer_name: format!("{coach} Team"),
            organizer_email: self.organizer_email.clone(),
        };
        self.mailer
            .send(&event.to_email(tz, rescheduling, stamp))
            .await?;
        tracing::info!(profile_id = %profile.id, uid = %uid, rescheduling, "calendar invitation sent");
        Ok(uid)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("persona", &self.persona.coach_name)
            .finish_non_exhaustive()
    }
}
