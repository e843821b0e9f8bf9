use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::clock::Clock;
use crate::core::error::Result;
use crate::features::rate_limits::models::{UsageScope, UsageSnapshot};
use crate::features::rate_limits::repositories::ActivityLogRepository;

/// Counts activity records inside a trailing window.
///
/// Snapshots read the same count as enforcement, so dashboards cannot drift
/// from what the engine sees.
pub struct UsageCounter {
    activity: Arc<dyn ActivityLogRepository>,
    clock: Arc<dyn Clock>,
}

impl UsageCounter {
    pub fn new(activity: Arc<dyn ActivityLogRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { activity, clock }
    }

    pub async fn count(&self, scope: &UsageScope, window_start: DateTime<Utc>) -> Result<i64> {
        self.activity.count(scope, window_start).await
    }

    /// Count for the window ending at `now`
    pub async fn count_in_window(
        &self,
        scope: &UsageScope,
        window_seconds: i32,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let window_start = now - chrono::Duration::seconds(i64::from(window_seconds));
        self.count(scope, window_start).await
    }

    pub async fn usage_snapshot(
        &self,
        limit: i32,
        window_seconds: i32,
        scope: &UsageScope,
    ) -> Result<UsageSnapshot> {
        let count = self
            .count_in_window(scope, window_seconds, self.clock.now())
            .await?;
        Ok(UsageSnapshot::from_count(count, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::features::rate_limits::models::NewActivityRecord;
    use crate::features::rate_limits::repositories::InMemoryActivityLog;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_snapshot_counts_only_inside_window() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let log = Arc::new(InMemoryActivityLog::new());
        let counter = UsageCounter::new(log.clone(), clock.clone());
        let user_id = Uuid::new_v4();

        for offset in [0, 10, 20] {
            log.append(NewActivityRecord {
                user_id: Some(user_id),
                endpoint: "/tasks".to_string(),
                method: "GET".to_string(),
                status_code: 200,
                response_time_ms: 1,
                timestamp: start + chrono::Duration::seconds(offset),
            })
            .await
            .unwrap();
        }

        clock.advance(chrono::Duration::seconds(65));
        let snapshot = counter
            .usage_snapshot(4, 60, &UsageScope::User { user_id })
            .await
            .unwrap();

        // the record at +0s is older than 60s
        assert_eq!(snapshot.current_usage, 2);
        assert_eq!(snapshot.percentage, 50.0);
    }
}
