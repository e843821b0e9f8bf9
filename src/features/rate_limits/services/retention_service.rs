use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::clock::Clock;
use crate::core::error::{AppError, Result};
use crate::features::rate_limits::repositories::ActivityLogRepository;
use crate::shared::constants::MAX_RETENTION_DAYS;

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionSweepResult {
    pub deleted: u64,
    pub cutoff: DateTime<Utc>,
    pub ran_at: DateTime<Utc>,
}

/// Deletes activity records that fall outside the retention period.
///
/// Records strictly older than `now - days` are removed; a record stamped
/// exactly at the cutoff stays, matching the `>=` used when counting.
pub struct ActivityRetentionService {
    repository: Arc<dyn ActivityLogRepository>,
    clock: Arc<dyn Clock>,
    default_days: i64,
    last_run: RwLock<Option<RetentionSweepResult>>,
}

impl ActivityRetentionService {
    pub fn new(
        repository: Arc<dyn ActivityLogRepository>,
        clock: Arc<dyn Clock>,
        default_days: i64,
    ) -> Self {
        Self {
            repository,
            clock,
            default_days,
            last_run: RwLock::new(None),
        }
    }

    pub fn default_days(&self) -> i64 {
        self.default_days
    }

    pub async fn sweep(&self, days: Option<i64>) -> Result<RetentionSweepResult> {
        let days = days.unwrap_or(self.default_days);
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "Retention days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        let ran_at = self.clock.now();
        let cutoff = chrono::Duration::try_days(days)
            .and_then(|period| ran_at.checked_sub_signed(period))
            .ok_or_else(|| {
                AppError::Validation("Retention period reaches before the earliest date".to_string())
            })?;
        let deleted = self.repository.purge_before(cutoff).await?;

        let result = RetentionSweepResult {
            deleted,
            cutoff,
            ran_at,
        };
        *self.last_run.write().await = Some(result);

        tracing::info!(
            "Retention sweep removed {} activity records older than {}",
            deleted,
            cutoff
        );

        Ok(result)
    }

    pub async fn last_run(&self) -> Option<RetentionSweepResult> {
        *self.last_run.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::features::rate_limits::models::{NewActivityRecord, UsageScope};
    use crate::features::rate_limits::repositories::InMemoryActivityLog;
    use uuid::Uuid;

    fn record(user_id: Uuid, timestamp: DateTime<Utc>) -> NewActivityRecord {
        NewActivityRecord {
            user_id: Some(user_id),
            endpoint: "/tasks".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            response_time_ms: 4,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_sweep_keeps_records_at_or_after_cutoff() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let log = Arc::new(InMemoryActivityLog::new());
        let service = ActivityRetentionService::new(log.clone(), clock, 90);
        let user_id = Uuid::new_v4();
        let cutoff = now - chrono::Duration::days(90);

        log.append(record(user_id, cutoff - chrono::Duration::seconds(1)))
            .await
            .unwrap();
        log.append(record(user_id, cutoff)).await.unwrap();
        log.append(record(user_id, now - chrono::Duration::seconds(30)))
            .await
            .unwrap();

        let result = service.sweep(None).await.unwrap();

        assert_eq!(result.deleted, 1);
        assert_eq!(result.cutoff, cutoff);
        assert_eq!(log.len().await, 2);

        // a one-hour window is untouched by the sweep
        let recent = log
            .count(&UsageScope::User { user_id }, now - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(recent, 1);
        assert_eq!(service.last_run().await, Some(result));
    }

    #[tokio::test]
    async fn test_sweep_rejects_non_positive_days() {
        let service = ActivityRetentionService::new(
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(ManualClock::new(Utc::now())),
            90,
        );

        let result = service.sweep(Some(0)).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(service.last_run().await, None);
    }

    #[tokio::test]
    async fn test_sweep_rejects_out_of_range_days() {
        let log = Arc::new(InMemoryActivityLog::new());
        let now = Utc::now();
        log.append(record(Uuid::new_v4(), now)).await.unwrap();
        let service =
            ActivityRetentionService::new(log.clone(), Arc::new(ManualClock::new(now)), 90);

        let result = service.sweep(Some(100_000_000)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = service.sweep(Some(MAX_RETENTION_DAYS + 1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        assert_eq!(log.len().await, 1);
        assert_eq!(service.last_run().await, None);
    }

    #[tokio::test]
    async fn test_sweep_accepts_max_days() {
        let service = ActivityRetentionService::new(
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(ManualClock::new(Utc::now())),
            MAX_RETENTION_DAYS,
        );

        let result = service.sweep(None).await.unwrap();

        assert_eq!(result.deleted, 0);
        assert_eq!(
            result.ran_at - result.cutoff,
            chrono::Duration::days(MAX_RETENTION_DAYS)
        );
    }
}
