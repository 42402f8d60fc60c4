//! Keep at most one scheduled call per profile.

use crate::store::{RecordStore, StoreResult};

/// Delete every scheduled call for the profile except the newest. Returns
/// how many were removed.
pub async fn reconcile_scheduled_calls(
    store: &dyn RecordStore,
    profile_id: &str,
) -> StoreResult<usize> {
    let calls = store.list_scheduled_calls(profile_id).await?;
    let Some(keep) = calls.first() else {
        return Ok(0);
    };
    let stale: Vec<String> = calls.iter().skip(1).map(|c| c.id.clone()).collect();
    if stale.is_empty() {
        return Ok(0);
    }
    let removed = store.delete_scheduled_calls(&stale).await?;
    tracing::info!(
        profile_id,
        removed,
        kept_date = %keep.date,
        kept_time = %keep.time,
        "removed older scheduled calls"
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::store::NewScheduledCall;
    use crate::test_utils::store_with_profile;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn keeps_only_newest() {
        let (store, profile) = store_with_profile(None).await;
        for day in [20, 21, 22] {
            store
                .insert_scheduled_call(&NewScheduledCall {
                    profile_id: profile.id.clone(),
                    date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
                    time: "10:00:00-04:00".into(),
                })
                .await
                .unwrap();
        }

        let removed = reconcile_scheduled_calls(store.as_ref(), &profile.id)
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let left = store.list_scheduled_calls(&profile.id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].date, NaiveDate::from_ymd_opt(2024, 3, 22).unwrap());

        assert_eq!(
            reconcile_scheduled_calls(store.as_ref(), &profile.id)
                .await
                .unwrap(),
            0
        );
    }
}
