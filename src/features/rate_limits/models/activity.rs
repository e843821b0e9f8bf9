use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The part of a stored activity record that counting and retention read
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

/// Data for appending an activity record
#[derive(Debug, Clone)]
pub struct NewActivityRecord {
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}
