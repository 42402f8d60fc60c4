//! First contact after signup: opt-in notice, greeting, then a call.

use std::sync::Arc;
use std::time::Duration;

use crate::notify::messages::{us_signup_notice, welcome_call_notice, welcome_greeting};
use crate::notify::{Notifier, NotifyError, is_us_phone_number};
use crate::store::Profile;
use crate::telephony::OutboundDialer;

/// Pauses between the welcome steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeDelays {
    pub after_notice: Duration,
    pub after_greeting: Duration,
    pub before_call: Duration,
}

impl Default for WelcomeDelays {
    fn default() -> Self {
        Self {
            after_notice: Duration::from_secs(1),
            after_greeting: Duration::from_secs(5),
            before_call: Duration::from_secs(10),
        }
    }
}

/// Sends the welcome texts and rings the new client.
pub struct WelcomeSequence {
    notifier: Arc<Notifier>,
    dialer: OutboundDialer,
    delays: WelcomeDelays,
}

impl WelcomeSequence {
    pub fn new(notifier: Arc<Notifier>, dialer: OutboundDialer, delays: WelcomeDelays) -> Self {
        Self {
            notifier,
            dialer,
            delays,
        }
    }

    /// Run every step. The opt-in notice only goes to US numbers. Returns
    /// the sid of the welcome call.
    pub async fn run(&self, profile: &Profile, first_name: Option<&str>) -> Result<String, NotifyError> {
        let persona = self.notifier.persona();
        let phone = profile.phone.as_str();

        if is_us_phone_number(phone) {
            self.notifier
                .send_sms(phone, &us_signup_notice(persona), Some(&profile.id))
                .await?;
            tokio::time::sleep(self.delays.after_notice).await;
        } else {
            tracing::debug!(phone, "skipping opt-in notice for non-US number");
        }

        self.notifier
            .send_sms(phone, &welcome_greeting(first_name, persona), Some(&profile.id))
            .await?;
        tokio::time::sleep(self.delays.after_greeting).await;
        self.notifier
            .send_sms(
                phone,
                &welcome_call_notice(&persona.save_contact_url),
                Some(&profile.id),
            )
            .await?;
        tracing::info!(profile_id = %profile.id, "welcome messages sent");

        tokio::time::sleep(self.delays.before_call).await;
        Ok(self.dialer.dial(phone).await?)
    }
}

impl std::fmt::Debug for WelcomeSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WelcomeSequence")
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::PersonaConfig;
    use crate::store::{NewProfile, RecordStore};
    use crate::test_utils::{FakeMailer, FakeTelephony, store_with_profile};
    use chrono::Utc;

    fn sequence(telephony: &Arc<FakeTelephony>, store: Arc<dyn RecordStore>) -> WelcomeSequence {
        let notifier = Arc::new(Notifier::new(
            telephony.clone(),
            store,
            Arc::new(FakeMailer::default()),
            PersonaConfig::default(),
            "team@meetmaximo.com",
        ));
        WelcomeSequence::new(
            notifier,
            OutboundDialer::new(telephony.clone(), "https://coach.example", "+15550009999"),
            WelcomeDelays::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn us_number_gets_notice_greeting_link_then_call() {
        let (store, profile) = store_with_profile(None).await;
        let telephony = Arc::new(FakeTelephony::default());
        let welcome = sequence(&telephony, store.clone());

        let sid = welcome.run(&profile, Some("Ada")).await.unwrap();
        assert!(sid.starts_with("CA"));

        let bodies = telephony.sms_bodies();
        assert_eq!(bodies.len(), 3);
        assert!(bodies[0].starts_with("You have successfully signed up for Maximo"));
        assert!(bodies[1].starts_with("Hi Ada, nice to meet you!"));
        assert!(bodies[2].contains("https://meetmaximo.com/save-contact"));
        assert_eq!(telephony.placed_calls()[0].to, profile.phone);
        assert_eq!(store.list_messages(&profile.id).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn canadian_number_skips_notice() {
        let (store, _) = store_with_profile(None).await;
        let profile = store
            .insert_profile(
                &NewProfile {
                    first_name: "Lucy".into(),
                    last_name: "Maud".into(),
                    email: None,
                    phone: "+14165550100".into(),
                    timezone: "America/Toronto".into(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let telephony = Arc::new(FakeTelephony::default());
        let welcome = sequence(&telephony, store.clone());

        welcome.run(&profile, None).await.unwrap();
        let bodies = telephony.sms_bodies();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].starts_with("Hi there,"));
    }
}
