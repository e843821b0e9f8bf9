use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::rate_limits::models::NewActivityRecord;
use crate::features::rate_limits::repositories::ActivityLogRepository;

/// Append-only sink for completed requests
pub struct ActivityService {
    repository: Arc<dyn ActivityLogRepository>,
}

impl ActivityService {
    pub fn new(repository: Arc<dyn ActivityLogRepository>) -> Self {
        Self { repository }
    }

    /// Record one completed request. Denied requests are recorded too.
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        endpoint: &str,
        method: &str,
        status_code: u16,
        response_time_ms: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.repository
            .append(NewActivityRecord {
                user_id,
                endpoint: endpoint.to_string(),
                method: method.to_ascii_uppercase(),
                status_code: i32::from(status_code),
                response_time_ms: response_time_ms.max(0),
                timestamp,
            })
            .await
    }
}
