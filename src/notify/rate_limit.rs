//! Rate limiting for inbound SMS.
//!
//! Each phone number gets an independent sliding one-minute window. The
//! limiter map is injected into the gateway state rather than living in a
//! global.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting error.
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; must wait before sending.
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    Exceeded {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },
}

/// Sliding-window limiter for one sender.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_per_minute: u32,
    window: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            window: VecDeque::new(),
        }
    }

    /// Record an event at `now`, or report how long until one is allowed.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), RateLimitError> {
        let window_start = now.checked_sub(WINDOW);
        while let Some(&first) = self.window.front() {
            match window_start {
                Some(start) if first < start => {
                    self.window.pop_front();
                }
                _ => break,
            }
        }

        if self.window.len() >= self.max_per_minute as usize {
            let remaining = self
                .window
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(WINDOW);
            return Err(RateLimitError::Exceeded {
                retry_after_secs: remaining.as_secs().saturating_add(1),
            });
        }

        self.window.push_back(now);
        Ok(())
    }

    /// Events remaining in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max_per_minute
            .saturating_sub(u32::try_from(self.window.len()).unwrap_or(u32::MAX))
    }

    fn is_idle_at(&self, now: Instant) -> bool {
        self.window
            .back()
            .is_none_or(|last| now.duration_since(*last) >= WINDOW)
    }
}

/// Per-phone limiters.
#[derive(Debug)]
pub struct PhoneRateLimiter {
    max_per_minute: u32,
    limiters: DashMap<String, RateLimiter>,
}

impl PhoneRateLimiter {
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            limiters: DashMap::new(),
        }
    }

    /// Record an inbound message from `phone`.
    pub fn try_acquire(&self, phone: &str) -> Result<(), RateLimitError> {
        self.try_acquire_at(phone, Instant::now())
    }

    pub fn try_acquire_at(&self, phone: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut entry = self
            .limiters
            .entry(phone.to_owned())
            .or_insert_with(|| RateLimiter::new(self.max_per_minute));
        let result = entry.try_acquire_at(now);
        if let Err(ref e) = result {
            tracing::warn!(phone, error = %e, "inbound SMS rate limited");
        }
        result
    }

    /// Drop limiters with no activity in the last window.
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    pub fn prune_at(&self, now: Instant) {
        let before = self.limiters.len();
        self.limiters.retain(|_, limiter| !limiter.is_idle_at(now));
        let dropped = before.saturating_sub(self.limiters.len());
        if dropped > 0 {
            tracing::debug!(dropped, "idle SMS rate limiters pruned");
        }
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn limiter_blocks_past_limit() {
        let mut limiter = RateLimiter::new(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.try_acquire_at(now).is_ok());
        }
        match limiter.try_acquire_at(now) {
            Err(RateLimitError::Exceeded { retry_after_secs }) => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 61);
            }
            Ok(()) => unreachable!("expected rate limit exceeded"),
        }
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn window_slides() {
        let mut limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start).is_ok());
        assert!(limiter.try_acquire_at(start + Duration::from_secs(30)).is_err());
        assert!(limiter.try_acquire_at(start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn phones_are_isolated() {
        let limiters = PhoneRateLimiter::new(2);
        let now = Instant::now();
        assert!(limiters.try_acquire_at("+15550001", now).is_ok());
        assert!(limiters.try_acquire_at("+15550001", now).is_ok());
        assert!(limiters.try_acquire_at("+15550001", now).is_err());
        assert!(limiters.try_acquire_at("+15550002", now).is_ok());
        assert_eq!(limiters.tracked(), 2);
    }

    #[test]
    fn prune_drops_only_idle_numbers() {
        let limiters = PhoneRateLimiter::new(2);
        let start = Instant::now();
        assert!(limiters.try_acquire_at("+15550001", start).is_ok());
        assert!(limiters.try_acquire_at("+15550002", start + Duration::from_secs(45)).is_ok());

        limiters.prune_at(start + Duration::from_secs(70));
        assert_eq!(limiters.tracked(), 1);
        limiters.prune_at(start + Duration::from_secs(120));
        assert_eq!(limiters.tracked(), 0);
    }
}
