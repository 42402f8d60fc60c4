//! Background sweeps run once a minute.
//!
//! Each tick walks the booked calls around today and the profiles that never
//! had a conversation:
//!
//! - morning reminder on the day of a booked call
//! - "I'm ready" text at call time, followed by an outbound call
//! - no-show flag and text once a call is well past with nobody answering
//! - inactivity nudges on set days after signup
//!
//! Each step is independent; a failure is logged and the tick moves on.

pub mod calls;
pub mod nudges;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SweepConfig;
use crate::notify::{Notifier, PhoneRateLimiter};
use crate::store::RecordStore;
use crate::telephony::OutboundDialer;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders: usize,
    pub calls_started: usize,
    pub no_shows: usize,
    pub nudges: usize,
}

/// Periodic reminder, call-time, no-show and nudge sweeps.
pub struct Sweeper {
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
    dialer: OutboundDialer,
    config: SweepConfig,
    /// Scheduled call ids already rung, with the call date.
    rung: DashMap<String, NaiveDate>,
    /// `(profile id, day)` nudges already sent, with the UTC send date.
    nudged: DashMap<(String, i64), NaiveDate>,
    /// Inbound SMS limiters, pruned every tick.
    sms_limits: Option<Arc<PhoneRateLimiter>>,
    shutdown: CancellationToken,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<Notifier>,
        dialer: OutboundDialer,
        config: SweepConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            notifier,
            dialer,
            config,
            rung: DashMap::new(),
            nudged: DashMap::new(),
            sms_limits: None,
            shutdown,
        }
    }

    /// Prune idle entries of `limits` on every tick.
    #[must_use]
    pub fn with_sms_limits(mut self, limits: Arc<PhoneRateLimiter>) -> Self {
        self.sms_limits = Some(limits);
        self
    }

    /// Forget rung calls and nudges dated before yesterday (UTC). Neither
    /// can fire again once its day is over.
    fn forget_stale(&self, now: DateTime<Utc>) {
        let Some(cutoff) = now.date_naive().pred_opt() else {
            return;
        };
        self.rung.retain(|_, date| *date >= cutoff);
        self.nudged.retain(|_, date| *date >= cutoff);
        if let Some(limits) = &self.sms_limits {
            limits.prune();
        }
    }

    /// Run one tick at `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        self.forget_stale(now);

        match self.booked_calls(now).await {
            Ok(booked) => {
                for (call, profile) in &booked {
                    match self.send_daily_reminder(call, profile, now).await {
                        Ok(true) => report.reminders += 1,
                        Ok(false) => {}
                        Err(e) => tracing::error!(call_id = %call.id, error = %e, "reminder sweep failed"),
                    }
                    match self.ring_on_time(call, profile, now).await {
                        Ok(true) => report.calls_started += 1,
                        Ok(false) => {}
                        Err(e) => tracing::error!(call_id = %call.id, error = %e, "call-time sweep failed"),
                    }
                    match self.flag_no_show(call, profile, now).await {
                        Ok(true) => report.no_shows += 1,
                        Ok(false) => {}
                        Err(e) => tracing::error!(call_id = %call.id, error = %e, "no-show sweep failed"),
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "loading booked calls failed"),
        }

        match self.inactive_profiles().await {
            Ok(profiles) => {
                for profile in &profiles {
                    if self.nudge(profile, now).await {
                        report.nudges += 1;
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "loading inactive profiles failed"),
        }

        if report != SweepReport::default() {
            tracing::info!(
                reminders = report.reminders,
                calls_started = report.calls_started,
                no_shows = report.no_shows,
                nudges = report.nudges,
                "sweep finished"
            );
        }
        report
    }

    /// Ring `phone` after the configured delay, unless shut down first.
    fn dial_later(&self, phone: String) {
        let dialer = self.dialer.clone();
        let delay = Duration::from_secs(self.config.outbound_call_delay_secs);
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(phone = %phone, "pending call-time dial cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = dialer.dial(&phone).await {
                        tracing::error!(phone = %phone, error = %e, "call-time dial failed");
                    }
                }
            }
        });
    }

    /// Start the sweep loop. Stops when the shutdown token fires.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let tick = Duration::from_secs(self.config.tick_secs.max(1));
            tracing::info!(tick_secs = tick.as_secs(), "sweeps started");
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep_at(Utc::now()).await;
                    }
                }
            }
            tracing::info!("sweeps stopped");
        })
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("config", &self.config)
            .field("rung", &self.rung.len())
            .field("nudged", &self.nudged.len())
            .finish_non_exhaustive()
    }
}
