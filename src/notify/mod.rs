//! Outbound notifications: SMS, email and calendar invitations.

pub mod calendar;
pub mod dispatcher;
pub mod mail;
pub mod messages;
pub mod phone;
pub mod rate_limit;

use thiserror::Error;

use crate::store::StoreError;
use crate::telephony::TelephonyError;

pub use calendar::CalendarEvent;
pub use dispatcher::{CallOutcome, Notifier, outcome_message};
pub use mail::{Attachment, Email, HttpMailer, Mailer};
pub use phone::{is_us_phone_number, normalize_phone_number};
pub use rate_limit::{PhoneRateLimiter, RateLimitError};

/// Errors from sending notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Telephony(#[from] TelephonyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("profile {0} has no email address")]
    MissingEmail(String),

    #[error("scheduled time cannot be parsed: {0}")]
    InvalidSchedule(String),

    #[error("mail delivery failed: {0}")]
    Mail(String),
}
