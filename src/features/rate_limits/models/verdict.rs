use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::UsageScope;

/// Precedence level that supplied the applicable limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Endpoint,
    User,
    Role,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Endpoint => "endpoint",
            Tier::User => "user",
            Tier::Role => "role",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Limit selected for a request, before usage is counted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedLimit {
    pub tier: Tier,
    pub limit: i32,
    pub window_seconds: i32,
    pub scope: UsageScope,
    /// Pattern of the matched endpoint limit (endpoint tier only)
    pub endpoint_pattern: Option<String>,
}

/// Outcome of one evaluation with its response metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub tier: Tier,
    pub limit: i32,
    pub remaining: i64,
    pub window_seconds: i32,
    pub reset_at: DateTime<Utc>,
    pub endpoint_pattern: Option<String>,
}

impl Verdict {
    /// `count` is the number of earlier requests in the window. `remaining`
    /// already accounts for the request being evaluated.
    pub fn from_usage(applied: AppliedLimit, count: i64, now: DateTime<Utc>) -> Self {
        let limit = i64::from(applied.limit);
        Self {
            allowed: count < limit,
            tier: applied.tier,
            limit: applied.limit,
            remaining: (limit - count - 1).max(0),
            window_seconds: applied.window_seconds,
            reset_at: now + chrono::Duration::seconds(i64::from(applied.window_seconds)),
            endpoint_pattern: applied.endpoint_pattern,
        }
    }

    /// Seconds until `reset_at`, measured from the evaluation instant
    pub fn retry_after_seconds(&self) -> i64 {
        i64::from(self.window_seconds)
    }
}

/// Internal result of an evaluation. Failures stay visible until the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// No identity on the request; throttling does not apply
    Anonymous,
    Allowed(Verdict),
    Denied(Verdict),
    EvaluationFailed(String),
}

/// What the admission gate does with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue to the handler, annotating the response when a verdict exists
    Pass(Option<Verdict>),
    Reject(Verdict),
}

impl Evaluation {
    pub fn into_decision(self) -> Decision {
        match self {
            Evaluation::Anonymous | Evaluation::EvaluationFailed(_) => Decision::Pass(None),
            Evaluation::Allowed(verdict) => Decision::Pass(Some(verdict)),
            Evaluation::Denied(verdict) => Decision::Reject(verdict),
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Evaluation::Allowed(verdict) | Evaluation::Denied(verdict) => Some(verdict),
            Evaluation::Anonymous | Evaluation::EvaluationFailed(_) => None,
        }
    }
}
