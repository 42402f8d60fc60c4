//! Inbound SMS webhook flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::history::{conversation_history, current_message_line};
use super::intent::{RescheduleIntents, analyze_reschedule, is_call_request};
use crate::analysis::store_sms_summaries;
use crate::error::Result;
use crate::llm::{GenerationRequest, ProviderError, Providers};
use crate::notify::messages::{
    CALL_FAILED, CALLING_NOW, RESCHEDULE_ACK, RESCHEDULE_ASK_TIME, SMS_TROUBLE, sms_signup_prompt,
};
use crate::notify::{Notifier, PhoneRateLimiter, normalize_phone_number};
use crate::prompt::ProfileContext;
use crate::prompt::sms::{sms_system_prompt, sms_user_prompt};
use crate::scheduling::SchedulingService;
use crate::store::{Profile, RecordStore, Sender};
use crate::telephony::OutboundDialer;

/// What happened to one inbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsOutcome {
    /// Dropped by the per-number rate limit.
    RateLimited,
    /// `From` or `Body` missing.
    Invalid,
    /// Unknown number; sent the signup link.
    SignupPrompted,
    /// Asked the client for a new time.
    AwaitingTime,
    /// Ran SMS scheduling; `booked` when a call was stored.
    Rescheduled { booked: bool },
    /// Client asked for a call; `placed` when dialing succeeded.
    CallRequested { placed: bool },
    /// Sent a coaching reply.
    Replied,
    /// Something failed; the client was told to try again if nothing else
    /// had been sent.
    Failed,
}

/// Shared collaborators for [`SmsHandler`].
pub struct SmsHandler {
    providers: Providers,
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    scheduling: Arc<SchedulingService>,
    dialer: OutboundDialer,
    limiter: Arc<PhoneRateLimiter>,
    intents: RescheduleIntents,
    summary_batch_size: usize,
}

impl SmsHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Providers,
        store: Arc<dyn RecordStore>,
        notifier: Arc<Notifier>,
        scheduling: Arc<SchedulingService>,
        dialer: OutboundDialer,
        limiter: Arc<PhoneRateLimiter>,
        intents: RescheduleIntents,
        summary_batch_size: usize,
    ) -> Self {
        Self {
            providers,
            store,
            notifier,
            scheduling,
            dialer,
            limiter,
            intents,
            summary_batch_size,
        }
    }

    pub fn intents(&self) -> &RescheduleIntents {
        &self.intents
    }

    pub fn limiter(&self) -> &PhoneRateLimiter {
        &self.limiter
    }

    /// Handle one webhook delivery.
    pub async fn handle(&self, from: Option<&str>, body: Option<&str>) -> SmsOutcome {
        self.handle_at(from, body, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        from: Option<&str>,
        body: Option<&str>,
        now: DateTime<Utc>,
    ) -> SmsOutcome {
        let from = from.map(str::trim).filter(|f| !f.is_empty());
        if let Some(phone) = from
            && self.limiter.try_acquire(phone).is_err()
        {
            return SmsOutcome::RateLimited;
        }
        let (Some(phone), Some(message)) = (from, body) else {
            tracing::warn!("sms webhook missing From or Body");
            return SmsOutcome::Invalid;
        };

        let mut replied = false;
        match self.process(phone, message, now, &mut replied).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(phone, error = %e, "handling inbound sms failed");
                if !replied
                    && let Err(e) = self.notifier.send_sms(phone, SMS_TROUBLE, None).await
                {
                    tracing::error!(phone, error = %e, "could not send sms error notice");
                }
                SmsOutcome::Failed
            }
        }
    }

    async fn process(
        &self,
        raw_phone: &str,
        message: &str,
        now: DateTime<Utc>,
        replied: &mut bool,
    ) -> Result<SmsOutcome> {
        let phone = normalize_phone_number(raw_phone)?;
        let Some(profile) = self.store.find_profile_by_phone(&phone).await? else {
            tracing::info!(phone = %phone, "sms from unknown number, sending signup link");
            self.notifier
                .send_sms(&phone, &sms_signup_prompt(self.notifier.persona()), None)
                .await?;
            *replied = true;
            return Ok(SmsOutcome::SignupPrompted);
        };

        let inbound = self
            .store
            .insert_message(&profile.id, message, Sender::User)
            .await?;

        if self.intents.is_awaiting(&phone) {
            tracing::info!(profile_id = %profile.id, "sms answers a reschedule question");
            let result = self.reschedule(&profile, message, now).await;
            self.intents.clear(&phone);
            let outcome = result?;
            *replied = true;
            return Ok(outcome);
        }

        let intent = analyze_reschedule(&self.providers, message).await;
        if intent.wants_to_reschedule {
            let Some(time) = intent.requested_time() else {
                self.notifier
                    .send_sms(&phone, RESCHEDULE_ASK_TIME, Some(&profile.id))
                    .await?;
                *replied = true;
                self.intents.mark_awaiting(&phone);
                return Ok(SmsOutcome::AwaitingTime);
            };
            let outcome = self.reschedule(&profile, time, now).await?;
            *replied = true;
            return Ok(outcome);
        }

        if is_call_request(&self.providers, message).await {
            tracing::info!(profile_id = %profile.id, "call requested over sms");
            let placed = match self.dialer.dial(&phone).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!(profile_id = %profile.id, error = %e, "requested call not placed");
                    false
                }
            };
            let reply = if placed { CALLING_NOW } else { CALL_FAILED };
            self.notifier
                .send_sms(&phone, reply, Some(&profile.id))
                .await?;
            *replied = true;
            return Ok(SmsOutcome::CallRequested { placed });
        }

        let reply = self.coaching_reply(&profile, &inbound.id, message, now).await?;
        self.notifier
            .send_sms(&phone, &reply, Some(&profile.id))
            .await?;
        *replied = true;

        if let Err(e) = store_sms_summaries(
            &self.providers,
            self.store.as_ref(),
            &profile.id,
            self.summary_batch_size,
        )
        .await
        {
            tracing::error!(profile_id = %profile.id, error = %e, "sms digest failed");
        }
        Ok(SmsOutcome::Replied)
    }

    async fn reschedule(
        &self,
        profile: &Profile,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<SmsOutcome> {
        let booked = self
            .scheduling
            .handle_sms_scheduling(profile, text, true, now)
            .await?;
        if booked {
            self.notifier
                .send_sms(&profile.phone, RESCHEDULE_ACK, Some(&profile.id))
                .await?;
        }
        Ok(SmsOutcome::Rescheduled { booked })
    }

    async fn coaching_reply(
        &self,
        profile: &Profile,
        inbound_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let ctx = ProfileContext::load(self.store.as_ref(), profile, now).await?;
        let history = conversation_history(self.store.as_ref(), &profile.id, Some(inbound_id)).await?;
        let system = sms_system_prompt(&ctx, self.notifier.persona(), now).build();
        let request = GenerationRequest::new(
            system,
            sms_user_prompt(&history, &current_message_line(message)),
        )
        .with_temperature(0.7)
        .with_max_tokens(1000);

        let reply = self.providers.prose().generate(&request).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ProviderError::Empty("sms reply".to_owned()).into());
        }
        Ok(reply.to_owned())
    }
}

impl std::fmt::Debug for SmsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsHandler")
            .field("awaiting_time", &self.intents.len())
            .field("rate_limited_numbers", &self.limiter.tracked())
            .field("summary_batch_size", &self.summary_batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use super::*;
    use crate::config::{PersonaConfig, SchedulingConfig};
    use crate::scheduling::SchedulingExtractor;
    use crate::store::{NewScheduledCall, SqliteRecordStore};
    use crate::test_utils::{
        FakeMailer, FakeTelephony, ScriptedProvider, providers, store_with_profile,
    };
    use chrono::{NaiveDate, TimeZone};

    const FRIDAY: &str = r#"{"scheduled": true, "scheduled_date": "2024-03-22",
        "scheduled_time": "10:00:00-04:00", "formatted_date_time": "March 22 at 10:00 AM",
        "rescheduling": true}"#;

    /// Routes requests by their system prompt.
    fn scripted(call_request: &'static str, reschedule: &'static str, reply: &'static str)
    -> Providers {
        let answer = move |req: &GenerationRequest| -> std::result::Result<String, ProviderError> {
            if req.system.contains("ONLY 'YES' or 'NO'") {
                Ok(call_request.to_owned())
            } else if req.system.contains("rescheduling requests") {
                Ok(reschedule.to_owned())
            } else if req.system.contains("extracts scheduling information") {
                Ok(FRIDAY.to_owned())
            } else if req.system.contains("concise summaries") {
                Ok("digest".to_owned())
            } else {
                Ok(reply.to_owned())
            }
        };
        providers(
            ScriptedProvider::new("anthropic", answer),
            ScriptedProvider::new("openai", answer),
        )
    }

    const NO_RESCHEDULE: &str = r#"{"wantsToReschedule": false, "newCallTime": null}"#;

    struct Harness {
        handler: SmsHandler,
        store: Arc<SqliteRecordStore>,
        telephony: Arc<FakeTelephony>,
        profile: Profile,
    }

    async fn harness(providers: Providers) -> Harness {
        harness_with_limit(providers, 10).await
    }

    async fn harness_with_limit(providers: Providers, limit: u32) -> Harness {
        let (store, profile) = store_with_profile(Some("ada@example.com")).await;
        let telephony = Arc::new(FakeTelephony::default());
        let notifier = Arc::new(Notifier::new(
            telephony.clone(),
            store.clone(),
            Arc::new(FakeMailer::default()),
            PersonaConfig::default(),
            "team@meetmaximo.com",
        ));
        let scheduling = Arc::new(SchedulingService::new(
            store.clone(),
            notifier.clone(),
            SchedulingExtractor::new(
                providers.clone(),
                PersonaConfig::default(),
                &SchedulingConfig::default(),
            ),
            Duration::ZERO,
        ));
        let dialer = OutboundDialer::new(telephony.clone(), "https://coach.example", "+15550009999");
        Harness {
            handler: SmsHandler::new(
                providers,
                store.clone(),
                notifier,
                scheduling,
                dialer,
                Arc::new(PhoneRateLimiter::new(limit)),
                RescheduleIntents::new(),
                10,
            ),
            store,
            telephony,
            profile,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn missing_fields_are_invalid() {
        let h = harness(scripted("NO", NO_RESCHEDULE, "hi")).await;
        assert_eq!(h.handler.handle_at(None, Some("hi"), now()).await, SmsOutcome::Invalid);
        assert_eq!(
            h.handler.handle_at(Some("+15555550100"), None, now()).await,
            SmsOutcome::Invalid
        );
        assert!(h.telephony.sent_sms().is_empty());
    }

    #[tokio::test]
    async fn unknown_number_gets_signup_link() {
        let h = harness(scripted("NO", NO_RESCHEDULE, "hi")).await;
        let outcome = h
            .handler
            .handle_at(Some("(555) 555-0199"), Some("hello?"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::SignupPrompted);
        let sent = h.telephony.sent_sms();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15555550199");
        assert!(sent[0].1.contains("please sign up first"));
    }

    #[tokio::test]
    async fn coaching_reply_is_sent_and_logged() {
        let h = harness(scripted("NO", NO_RESCHEDULE, "Try delegating one task today.")).await;
        let outcome = h
            .handler
            .handle_at(Some("+15555550100"), Some("How do I delegate?"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::Replied);
        assert_eq!(
            h.telephony.sms_bodies(),
            vec!["Try delegating one task today.".to_owned()]
        );

        let log = h.store.list_messages(&h.profile.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender, Sender::User);
        assert_eq!(log[0].content, "How do I delegate?");
        assert_eq!(log[1].sender, Sender::Ai);
    }

    #[tokio::test]
    async fn reply_prompt_carries_history_and_current_message() {
        let anthropic = ScriptedProvider::new("anthropic", |req| {
            if req.system.contains("ONLY 'YES' or 'NO'") {
                Ok("NO".to_owned())
            } else {
                Ok("Sounds good.".to_owned())
            }
        });
        let openai = ScriptedProvider::always("openai", NO_RESCHEDULE);
        let h = harness(providers(anthropic.clone(), openai)).await;
        h.store
            .insert_message(&h.profile.id, "earlier question", Sender::User)
            .await
            .unwrap();

        h.handler
            .handle_at(Some("+15555550100"), Some("follow up"), now())
            .await;

        let reply_request = anthropic
            .requests()
            .into_iter()
            .find(|r| r.temperature == Some(0.7))
            .unwrap();
        assert_eq!(reply_request.max_tokens, 1000);
        assert!(reply_request.user.starts_with("Message 1: [SMS] User: earlier question"));
        assert!(reply_request.user.ends_with("Current message: [SMS] User: follow up"));
        assert!(!reply_request.user.contains("Message 2: [SMS] User: follow up"));
    }

    #[tokio::test]
    async fn call_request_dials_and_confirms() {
        let h = harness(scripted("YES", NO_RESCHEDULE, "unused")).await;
        let outcome = h
            .handler
            .handle_at(Some("+15555550100"), Some("call me now please"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::CallRequested { placed: true });
        let calls = h.telephony.placed_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, "+15555550100");
        assert_eq!(calls[0].from, "+15550009999");
        assert_eq!(h.telephony.sms_bodies(), vec![CALLING_NOW.to_owned()]);
    }

    #[tokio::test]
    async fn failed_dial_says_so() {
        let h = harness(scripted("YES", NO_RESCHEDULE, "unused")).await;
        h.telephony.fail_outbound_calls();
        let outcome = h
            .handler
            .handle_at(Some("+15555550100"), Some("call me"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::CallRequested { placed: false });
        assert_eq!(h.telephony.sms_bodies(), vec![CALL_FAILED.to_owned()]);
    }

    #[tokio::test]
    async fn reschedule_without_time_asks_then_books_on_next_text() {
        let h = harness(scripted(
            "NO",
            r#"{"wantsToReschedule": true, "newCallTime": null}"#,
            "unused",
        ))
        .await;

        let first = h
            .handler
            .handle_at(Some("+15555550100"), Some("I need to move our call"), now())
            .await;
        assert_eq!(first, SmsOutcome::AwaitingTime);
        assert!(h.handler.intents().is_awaiting("+15555550100"));
        assert_eq!(h.telephony.sms_bodies(), vec![RESCHEDULE_ASK_TIME.to_owned()]);

        let second = h
            .handler
            .handle_at(Some("+15555550100"), Some("friday at 10"), now())
            .await;
        assert_eq!(second, SmsOutcome::Rescheduled { booked: true });
        assert!(!h.handler.intents().is_awaiting("+15555550100"));
        assert!(h.telephony.sms_bodies().contains(&RESCHEDULE_ACK.to_owned()));

        let calls = h.store.list_scheduled_calls(&h.profile.id).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].date, NaiveDate::from_ymd_opt(2024, 3, 22).unwrap());
    }

    #[tokio::test]
    async fn reschedule_with_time_books_directly() {
        let h = harness(scripted(
            "NO",
            r#"{"wantsToReschedule": true, "newCallTime": "Friday at 10am"}"#,
            "unused",
        ))
        .await;
        h.store
            .insert_scheduled_call(&NewScheduledCall {
                profile_id: h.profile.id.clone(),
                date: NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
                time: "09:00:00-04:00".into(),
            })
            .await
            .unwrap();

        let outcome = h
            .handler
            .handle_at(Some("+15555550100"), Some("can we do friday at 10am instead"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::Rescheduled { booked: true });

        let calls = h.store.list_scheduled_calls(&h.profile.id).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].date, NaiveDate::from_ymd_opt(2024, 3, 22).unwrap());
        assert!(h.telephony.placed_calls().is_empty());
    }

    #[tokio::test]
    async fn provider_outage_sends_trouble_notice() {
        let h = harness(providers(
            ScriptedProvider::failing("anthropic"),
            ScriptedProvider::failing("openai"),
        ))
        .await;
        let outcome = h
            .handler
            .handle_at(Some("+15555550100"), Some("How do I delegate?"), now())
            .await;
        assert_eq!(outcome, SmsOutcome::Failed);
        assert_eq!(h.telephony.sms_bodies(), vec![SMS_TROUBLE.to_owned()]);
    }

    #[tokio::test]
    async fn rate_limited_numbers_are_dropped_silently() {
        let h = harness_with_limit(scripted("NO", NO_RESCHEDULE, "ok"), 1).await;
        assert_eq!(
            h.handler
                .handle_at(Some("+15555550100"), Some("one"), now())
                .await,
            SmsOutcome::Replied
        );
        assert_eq!(
            h.handler
                .handle_at(Some("+15555550100"), Some("two"), now())
                .await,
            SmsOutcome::RateLimited
        );
        assert_eq!(h.telephony.sms_bodies().len(), 1);
    }
}
