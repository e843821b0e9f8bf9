use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::rate_limits::models::{Tier, UsageReport, Verdict};
use crate::features::rate_limits::services::RetentionSweepResult;
use crate::shared::constants::MAX_RETENTION_DAYS;

/// Body of a 429 response. Same shape for every tier.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceededDto {
    pub success: bool,
    pub message: String,
    /// Seconds until the window resets
    pub retry_after: i64,
    pub tier: String,
    /// Matched endpoint pattern, only for endpoint-tier denials
    pub endpoint: Option<String>,
}

impl From<&Verdict> for RateLimitExceededDto {
    fn from(verdict: &Verdict) -> Self {
        let message = match verdict.tier {
            Tier::Endpoint => "Rate limit exceeded for this endpoint",
            Tier::User => "Rate limit exceeded for this user",
            Tier::Role => "Rate limit exceeded for this role",
        };

        Self {
            success: false,
            message: message.to_string(),
            retry_after: verdict.retry_after_seconds(),
            tier: verdict.tier.to_string(),
            endpoint: verdict.endpoint_pattern.clone(),
        }
    }
}

/// Caller's current standing against the limit that applies to them
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitStatusDto {
    pub tier: Tier,
    pub limit: i32,
    pub remaining: i64,
    pub window_seconds: i32,
    /// Whether the next request would be admitted
    pub allowed: bool,
    pub resets_at: DateTime<Utc>,
    pub endpoint_pattern: Option<String>,
}

impl From<Verdict> for RateLimitStatusDto {
    fn from(verdict: Verdict) -> Self {
        Self {
            tier: verdict.tier,
            limit: verdict.limit,
            remaining: verdict.remaining,
            window_seconds: verdict.window_seconds,
            allowed: verdict.allowed,
            resets_at: verdict.reset_at,
            endpoint_pattern: verdict.endpoint_pattern,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RateLimitStatusQuery {
    /// Route template to check, e.g. `/api/tasks/{id}`
    pub endpoint: Option<String>,
    /// HTTP method for `endpoint` (default: GET)
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UsageResponseDto {
    pub tier: Tier,
    pub limit: i32,
    pub window_seconds: i32,
    pub current_usage: i64,
    /// Share of the limit consumed, 0-100 with two decimals
    pub percentage: f64,
}

impl From<UsageReport> for UsageResponseDto {
    fn from(report: UsageReport) -> Self {
        Self {
            tier: report.tier,
            limit: report.limit,
            window_seconds: report.window_seconds,
            current_usage: report.snapshot.current_usage,
            percentage: report.snapshot.percentage,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct UserUsageQuery {
    /// Role of the user (ADMIN, MANAGER or USER); the user's own override takes priority
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct EndpointUsageQuery {
    pub pattern: String,
    /// HTTP method or `*` (default: `*`)
    pub method: Option<String>,
    /// Restrict the count to one user
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetentionSweepResponseDto {
    pub deleted: u64,
    pub cutoff: DateTime<Utc>,
    pub ran_at: DateTime<Utc>,
}

impl From<RetentionSweepResult> for RetentionSweepResponseDto {
    fn from(result: RetentionSweepResult) -> Self {
        Self {
            deleted: result.deleted,
            cutoff: result.cutoff,
            ran_at: result.ran_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetentionStatusDto {
    pub retention_days: i64,
    pub last_run: Option<RetentionSweepResponseDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct TriggerRetentionSweepDto {
    /// Override the configured retention period for this run
    #[validate(range(
        min = 1,
        max = MAX_RETENTION_DAYS,
        message = "days must be between 1 and 36500"
    ))]
    pub days: Option<i64>,
}
