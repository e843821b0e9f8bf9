use uuid::Uuid;

use super::Tier;

/// Which methods of an endpoint pattern are counted together
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Wildcard entry: every method on the pattern
    Any,
    Exact(String),
}

/// Set of activity records a limit is counted against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    Endpoint {
        pattern: String,
        method: MethodFilter,
        /// `None` counts every caller of the endpoint
        user_id: Option<Uuid>,
    },
    /// Every request of the user, regardless of endpoint
    User { user_id: Uuid },
}

/// Current consumption of a limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSnapshot {
    pub current_usage: i64,
    pub percentage: f64,
}

impl UsageSnapshot {
    pub fn from_count(count: i64, limit: i32) -> Self {
        let percentage = if limit > 0 {
            let raw = (count as f64 / limit as f64 * 100.0).min(100.0);
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            current_usage: count,
            percentage,
        }
    }
}

/// Usage of whichever limit applies to a scope, for admin dashboards
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub tier: Tier,
    pub limit: i32,
    pub window_seconds: i32,
    pub snapshot: UsageSnapshot,
}
