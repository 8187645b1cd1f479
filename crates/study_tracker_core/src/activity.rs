//! crates/study_tracker_core/src/activity.rs
//!
//! Presence tracking: the signed-in user's heartbeat and the admin page's
//! live counters built from today's activity records.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::UserActivity;
use crate::ports::{Clock, DocumentSnapshot, Shell};
use crate::store::{decode, StudyStore};
use crate::tasks::TickJob;

/// Admin dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    /// Users with any activity today.
    pub daily_logins: usize,
    /// Distinct users active within the active window.
    pub active_users: usize,
}

/// `YYYY-MM-DD` (UTC) for a millisecond timestamp.
pub fn day_of(now_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

pub fn live_stats(records: &[UserActivity], now_ms: i64, active_window: Duration) -> LiveStats {
    let window = i64::try_from(active_window.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_ms.saturating_sub(window);
    let active: HashSet<&str> = records
        .iter()
        .filter(|r| r.last_active > cutoff)
        .map(|r| r.user_id.as_str())
        .collect();
    LiveStats {
        daily_logins: records.len(),
        active_users: active.len(),
    }
}

fn records(snapshots: Vec<DocumentSnapshot>) -> Vec<UserActivity> {
    snapshots
        .into_iter()
        .filter_map(|snap| match decode::<UserActivity>(snap.data) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(id = %snap.id, error = %e, "skipping malformed activity record");
                None
            }
        })
        .collect()
}

/// The heartbeat tick: stamps `uid` as active today.
pub fn heartbeat_job(store: StudyStore, clock: Arc<dyn Clock>, uid: String) -> TickJob {
    Arc::new(move || {
        let store = store.clone();
        let clock = clock.clone();
        let uid = uid.clone();
        Box::pin(async move {
            let now = clock.now_ms();
            store.touch_activity(&uid, &day_of(now), now).await
        })
    })
}

/// Keeps the admin counters current: recomputes on every change to today's
/// activity and on every `period` tick (so users age out of "active").
pub async fn live_stats_task(
    store: StudyStore,
    clock: Arc<dyn Clock>,
    shell: Arc<dyn Shell>,
    period: Duration,
    active_window: Duration,
    cancel: CancellationToken,
) {
    let today = day_of(clock.now_ms());
    let mut updates = store.gateway().subscribe(StudyStore::activity_query(&today));
    let mut latest: Vec<UserActivity> = Vec::new();
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = updates.next() => match update {
                Some(Ok(snapshots)) => {
                    latest = records(snapshots);
                    shell.live_stats(live_stats(&latest, clock.now_ms(), active_window));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "activity subscription failed");
                    shell.live_stats(LiveStats::default());
                }
                None => break,
            },
            _ = interval.tick() => {
                shell.live_stats(live_stats(&latest, clock.now_ms(), active_window));
            }
        }
    }
    debug!("live stats task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uid: &str, last_active: i64) -> UserActivity {
        UserActivity {
            user_id: uid.into(),
            date: "2026-10-19".into(),
            last_active,
        }
    }

    #[test]
    fn counts_recently_active_users_once() {
        let five_min = Duration::from_secs(300);
        let now = 1_000_000;
        let records = [
            record("a", now - 1_000),
            record("b", now - 299_000),
            record("c", now - 300_000),
            record("a", now - 10),
        ];
        let stats = live_stats(&records, now, five_min);
        assert_eq!(stats.daily_logins, 4);
        assert_eq!(stats.active_users, 2);
    }

    #[test]
    fn formats_utc_day() {
        // 2026-10-19T12:00:00Z
        assert_eq!(day_of(1_792_411_200_000), "2026-10-19");
    }
}
