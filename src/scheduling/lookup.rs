//! Call classification and upcoming-call lookup.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::timezone::{format_for_humans, scheduled_start};
use crate::store::{RecordStore, ScheduledCall, StoreResult};

/// How an incoming call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallClassification {
    /// Whether the coach persona takes the call.
    pub is_scheduled: bool,
    /// Prior coach conversations that did not go to voicemail.
    pub max_call_number: usize,
}

impl CallClassification {
    /// First ever coach call.
    pub fn is_discovery(&self) -> bool {
        self.max_call_number == 0
    }
}

/// Discovery if the profile never talked to the coach, otherwise scheduled
/// only when a call is booked for `today` (profile-local).
pub async fn lookup_call_type(
    store: &dyn RecordStore,
    profile_id: &str,
    today: NaiveDate,
) -> StoreResult<CallClassification> {
    let max_call_number = store.count_coach_conversations(profile_id).await?;
    if max_call_number == 0 {
        tracing::debug!(profile_id, "discovery call");
        return Ok(CallClassification {
            is_scheduled: true,
            max_call_number,
        });
    }

    let is_scheduled = store
        .list_scheduled_calls(profile_id)
        .await?
        .iter()
        .any(|call| call.date == today);
    tracing::debug!(profile_id, max_call_number, is_scheduled, "classified call");
    Ok(CallClassification {
        is_scheduled,
        max_call_number,
    })
}

/// The profile's active scheduled call, when it is still ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingCall {
    pub call: ScheduledCall,
    pub start: DateTime<FixedOffset>,
    /// e.g. `March 19 at 6:00 PM`, in the call's own offset.
    pub formatted: String,
}

/// The newest scheduled call, or `None` when there is none or it has passed.
pub async fn upcoming_scheduled_call(
    store: &dyn RecordStore,
    profile_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<Option<UpcomingCall>> {
    let Some(call) = store.list_scheduled_calls(profile_id).await?.into_iter().next() else {
        return Ok(None);
    };
    let Some(start) = scheduled_start(call.date, &call.time) else {
        tracing::warn!(call_id = %call.id, time = %call.time, "scheduled call has an unparseable time");
        return Ok(None);
    };
    if start.with_timezone(&Utc) < now {
        return Ok(None);
    }
    Ok(Some(UpcomingCall {
        formatted: format_for_humans(start),
        call,
        start,
    }))
}
