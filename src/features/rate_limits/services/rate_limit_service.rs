use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::config::RateLimitSettings;
use crate::core::error::{AppError, Result};
use crate::features::auth::model::{AuthenticatedUser, Role};
use crate::features::rate_limits::models::{
    AppliedLimit, EndpointLimit, Evaluation, MethodFilter, RoleLimit, Tier, UsageReport,
    UsageScope, UserLimit, Verdict,
};
use crate::features::rate_limits::services::{RateLimitConfigService, UsageCounter};

/// Every configuration entry that could apply to one request
#[derive(Debug, Clone, Default)]
pub struct LimitCandidates {
    pub endpoint_specific: Option<EndpointLimit>,
    pub endpoint_wildcard: Option<EndpointLimit>,
    pub user: Option<UserLimit>,
    pub role: Option<RoleLimit>,
}

/// Pick the single limit that governs a request.
///
/// Priority: enabled specific-method endpoint entry, enabled wildcard endpoint
/// entry, enabled user limit, enabled role limit, then `fallback`
/// (`(limit, window_seconds)`). Disabled entries are skipped.
pub fn resolve_applicable_limit(
    user_id: Uuid,
    candidates: &LimitCandidates,
    fallback: (i32, i32),
) -> AppliedLimit {
    let endpoint = candidates
        .endpoint_specific
        .iter()
        .chain(candidates.endpoint_wildcard.iter())
        .find(|l| l.enabled);

    if let Some(endpoint) = endpoint {
        let method = if endpoint.is_wildcard() {
            MethodFilter::Any
        } else {
            MethodFilter::Exact(endpoint.method.clone())
        };

        return AppliedLimit {
            tier: Tier::Endpoint,
            limit: endpoint.limit,
            window_seconds: endpoint.window_seconds,
            scope: UsageScope::Endpoint {
                pattern: endpoint.endpoint_pattern.clone(),
                method,
                user_id: Some(user_id),
            },
            endpoint_pattern: Some(endpoint.endpoint_pattern.clone()),
        };
    }

    if let Some(user) = candidates.user.as_ref().filter(|l| l.enabled) {
        return AppliedLimit {
            tier: Tier::User,
            limit: user.limit,
            window_seconds: user.window_seconds,
            scope: UsageScope::User { user_id },
            endpoint_pattern: None,
        };
    }

    let (limit, window_seconds) = candidates
        .role
        .as_ref()
        .filter(|l| l.enabled)
        .map(|l| (l.limit, l.window_seconds))
        .unwrap_or(fallback);

    AppliedLimit {
        tier: Tier::Role,
        limit,
        window_seconds,
        scope: UsageScope::User { user_id },
        endpoint_pattern: None,
    }
}

/// Decides whether an authenticated request may proceed.
///
/// Reads configuration and counts past activity; it never reserves a slot, so
/// concurrent requests inside one window may overshoot the limit until their
/// activity records land.
pub struct RateLimitService {
    config: Arc<RateLimitConfigService>,
    counter: Arc<UsageCounter>,
    clock: Arc<dyn Clock>,
    fallback: (i32, i32),
    evaluation_timeout: Duration,
}

impl RateLimitService {
    pub fn new(
        config: Arc<RateLimitConfigService>,
        counter: Arc<UsageCounter>,
        clock: Arc<dyn Clock>,
        settings: &RateLimitSettings,
    ) -> Self {
        Self {
            config,
            counter,
            clock,
            fallback: (settings.default_limit, settings.default_window_secs),
            evaluation_timeout: settings.evaluation_timeout,
        }
    }

    async fn load_candidates(
        &self,
        user: &AuthenticatedUser,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<LimitCandidates> {
        let ((endpoint_specific, endpoint_wildcard), user_limit, role_limit) = tokio::try_join!(
            self.config.endpoint_candidates(endpoint_pattern, method),
            self.config.get_by_user(user.id),
            self.config.get_by_role(user.role),
        )?;

        Ok(LimitCandidates {
            endpoint_specific,
            endpoint_wildcard,
            user: user_limit,
            role: role_limit,
        })
    }

    async fn try_evaluate(
        &self,
        user: &AuthenticatedUser,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<Verdict> {
        let candidates = self.load_candidates(user, endpoint_pattern, method).await?;
        let applied = resolve_applicable_limit(user.id, &candidates, self.fallback);

        let now = self.clock.now();
        let count = self
            .counter
            .count_in_window(&applied.scope, applied.window_seconds, now)
            .await?;

        Ok(Verdict::from_usage(applied, count, now))
    }

    /// Evaluate one request. Never fails: storage errors and timeouts come back
    /// as `EvaluationFailed`.
    pub async fn evaluate(
        &self,
        identity: Option<&AuthenticatedUser>,
        endpoint_pattern: &str,
        method: &str,
    ) -> Evaluation {
        let Some(user) = identity else {
            return Evaluation::Anonymous;
        };

        let result = tokio::time::timeout(
            self.evaluation_timeout,
            self.try_evaluate(user, endpoint_pattern, method),
        )
        .await;

        match result {
            Ok(Ok(verdict)) if verdict.allowed => Evaluation::Allowed(verdict),
            Ok(Ok(verdict)) => {
                tracing::warn!(
                    user_id = %user.id,
                    tier = %verdict.tier,
                    limit = verdict.limit,
                    "Rate limit exceeded for {} {}",
                    method,
                    endpoint_pattern
                );
                Evaluation::Denied(verdict)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    user_id = %user.id,
                    "Rate limit evaluation failed for {} {}, allowing request: {}",
                    method,
                    endpoint_pattern,
                    e
                );
                Evaluation::EvaluationFailed(e.to_string())
            }
            Err(_) => {
                tracing::error!(
                    user_id = %user.id,
                    "Rate limit evaluation timed out after {:?} for {} {}, allowing request",
                    self.evaluation_timeout,
                    method,
                    endpoint_pattern
                );
                Evaluation::EvaluationFailed("evaluation timed out".to_string())
            }
        }
    }

    /// Verdict the caller would get right now, without recording a request.
    /// Without an endpoint only the user and role tiers are considered.
    pub async fn current_verdict(
        &self,
        user: &AuthenticatedUser,
        endpoint: Option<(&str, &str)>,
    ) -> Result<Verdict> {
        match endpoint {
            Some((pattern, method)) => {
                let method = RateLimitConfigService::normalize_method(method)?;
                self.try_evaluate(user, pattern, &method).await
            }
            None => {
                let applied = self.account_limit(user.id, user.role).await?;
                let now = self.clock.now();
                let count = self
                    .counter
                    .count_in_window(&applied.scope, applied.window_seconds, now)
                    .await?;
                Ok(Verdict::from_usage(applied, count, now))
            }
        }
    }

    async fn account_limit(&self, user_id: Uuid, role: Role) -> Result<AppliedLimit> {
        let (user_limit, role_limit) = tokio::try_join!(
            self.config.get_by_user(user_id),
            self.config.get_by_role(role),
        )?;

        let candidates = LimitCandidates {
            user: user_limit,
            role: role_limit,
            ..Default::default()
        };
        Ok(resolve_applicable_limit(user_id, &candidates, self.fallback))
    }

    /// Usage of the limit that applies to a user outside any endpoint rule
    pub async fn user_usage(&self, user_id: Uuid, role: Role) -> Result<UsageReport> {
        let applied = self.account_limit(user_id, role).await?;
        self.report(applied).await
    }

    /// Usage of an endpoint limit, for every caller or for one user
    pub async fn endpoint_usage(
        &self,
        endpoint_pattern: &str,
        method: &str,
        user_id: Option<Uuid>,
    ) -> Result<UsageReport> {
        let limit = self
            .config
            .get_by_endpoint(endpoint_pattern, method)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No endpoint limit for {} {}",
                    method, endpoint_pattern
                ))
            })?;

        let method = if limit.is_wildcard() {
            MethodFilter::Any
        } else {
            MethodFilter::Exact(limit.method.clone())
        };
        let applied = AppliedLimit {
            tier: Tier::Endpoint,
            limit: limit.limit,
            window_seconds: limit.window_seconds,
            scope: UsageScope::Endpoint {
                pattern: limit.endpoint_pattern.clone(),
                method,
                user_id,
            },
            endpoint_pattern: Some(limit.endpoint_pattern),
        };

        self.report(applied).await
    }

    async fn report(&self, applied: AppliedLimit) -> Result<UsageReport> {
        let snapshot = self
            .counter
            .usage_snapshot(applied.limit, applied.window_seconds, &applied.scope)
            .await?;

        Ok(UsageReport {
            tier: applied.tier,
            limit: applied.limit,
            window_seconds: applied.window_seconds,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::features::rate_limits::models::{Decision, LimitValues, NewActivityRecord};
    use crate::features::rate_limits::repositories::{
        ActivityLogRepository, InMemoryActivityLog, InMemoryRateLimitStore,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use fake::{Fake, Faker};

    struct Harness {
        engine: RateLimitService,
        config: Arc<RateLimitConfigService>,
        log: Arc<InMemoryActivityLog>,
        clock: Arc<ManualClock>,
        admin: Uuid,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let log = Arc::new(InMemoryActivityLog::new());
            Self::with_log(log.clone(), log, clock)
        }

        fn with_log(
            log: Arc<InMemoryActivityLog>,
            activity: Arc<dyn ActivityLogRepository>,
            clock: Arc<ManualClock>,
        ) -> Self {
            let config = Arc::new(RateLimitConfigService::new(Arc::new(
                InMemoryRateLimitStore::new(),
            )));
            let counter = Arc::new(UsageCounter::new(activity, clock.clone()));
            let engine = RateLimitService::new(
                config.clone(),
                counter,
                clock.clone(),
                &RateLimitSettings::default(),
            );

            Self {
                engine,
                config,
                log,
                clock,
                admin: Uuid::new_v4(),
            }
        }

        /// Evaluate and, when admitted, log the request the way the middleware would
        async fn request(&self, user: &AuthenticatedUser, endpoint: &str, method: &str) -> Evaluation {
            let evaluation = self.engine.evaluate(Some(user), endpoint, method).await;
            self.log
                .append(NewActivityRecord {
                    user_id: Some(user.id),
                    endpoint: endpoint.to_string(),
                    method: method.to_string(),
                    status_code: if matches!(evaluation, Evaluation::Denied(_)) { 429 } else { 200 },
                    response_time_ms: 2,
                    timestamp: self.clock.now(),
                })
                .await
                .unwrap();
            evaluation
        }
    }

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Faker.fake::<Uuid>(),
            role,
        }
    }

    fn values(limit: i32, window_seconds: i32) -> LimitValues {
        LimitValues {
            limit,
            window_seconds,
            enabled: true,
        }
    }

    fn tier_of(evaluation: &Evaluation) -> Option<Tier> {
        evaluation.verdict().map(|v| v.tier)
    }

    #[tokio::test]
    async fn test_role_limit_denies_sixth_request_in_window() {
        let h = Harness::new();
        h.config
            .update_role_limit(h.admin, Role::User, values(5, 60))
            .await
            .unwrap();
        let alice = user(Role::User);

        for i in 0..5 {
            let evaluation = h.request(&alice, "/api/projects", "GET").await;
            match evaluation {
                Evaluation::Allowed(v) => assert_eq!(v.remaining, 4 - i),
                other => panic!("request {} should pass, got {:?}", i + 1, other),
            }
            h.clock.advance(chrono::Duration::seconds(1));
        }

        let sixth = h.request(&alice, "/api/projects", "GET").await;
        let Evaluation::Denied(verdict) = sixth else {
            panic!("sixth request should be denied");
        };
        assert_eq!(verdict.tier, Tier::Role);
        assert_eq!(verdict.remaining, 0);
        assert!(verdict.retry_after_seconds() <= 60);
    }

    #[tokio::test]
    async fn test_window_elapses_and_remaining_resets() {
        let h = Harness::new();
        h.config
            .update_role_limit(h.admin, Role::User, values(5, 60))
            .await
            .unwrap();
        let alice = user(Role::User);

        for _ in 0..6 {
            h.request(&alice, "/api/projects", "GET").await;
        }
        h.clock.advance(chrono::Duration::seconds(61));

        let evaluation = h.engine.evaluate(Some(&alice), "/api/projects", "GET").await;
        let Evaluation::Allowed(verdict) = evaluation else {
            panic!("request after the window should pass");
        };
        assert_eq!(verdict.remaining, 4);
    }

    #[tokio::test]
    async fn test_specific_endpoint_limit_outranks_wildcard_user_and_role() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .create_endpoint_limit(h.admin, "/tasks", "POST", values(2, 60))
            .await
            .unwrap();
        h.config
            .create_endpoint_limit(h.admin, "/tasks", "*", values(10, 60))
            .await
            .unwrap();
        h.config
            .set_user_limit(h.admin, alice.id, values(100, 60))
            .await
            .unwrap();

        assert_eq!(tier_of(&h.request(&alice, "/tasks", "POST").await), Some(Tier::Endpoint));
        h.request(&alice, "/tasks", "POST").await;
        let third = h.request(&alice, "/tasks", "POST").await;

        let Evaluation::Denied(verdict) = third else {
            panic!("third POST should hit the specific endpoint limit");
        };
        assert_eq!(verdict.limit, 2);
        assert_eq!(verdict.endpoint_pattern.as_deref(), Some("/tasks"));

        // GET falls through to the wildcard entry, which counts every method
        let get = h.engine.evaluate(Some(&alice), "/tasks", "GET").await;
        let Evaluation::Allowed(verdict) = get else {
            panic!("GET should be allowed by the wildcard entry");
        };
        assert_eq!(verdict.tier, Tier::Endpoint);
        assert_eq!(verdict.limit, 10);
        assert_eq!(verdict.remaining, 10 - 3 - 1);
    }

    #[tokio::test]
    async fn test_without_wildcard_other_methods_fall_to_user_tier() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .create_endpoint_limit(h.admin, "/tasks", "POST", values(2, 60))
            .await
            .unwrap();
        h.config
            .set_user_limit(h.admin, alice.id, values(100, 60))
            .await
            .unwrap();

        let get = h.engine.evaluate(Some(&alice), "/tasks", "GET").await;
        assert_eq!(tier_of(&get), Some(Tier::User));
    }

    #[tokio::test]
    async fn test_disabled_specific_entry_falls_back_to_wildcard() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .create_endpoint_limit(
                h.admin,
                "/tasks",
                "POST",
                LimitValues {
                    enabled: false,
                    ..values(2, 60)
                },
            )
            .await
            .unwrap();
        h.config
            .create_endpoint_limit(h.admin, "/tasks", "*", values(10, 60))
            .await
            .unwrap();

        let evaluation = h.engine.evaluate(Some(&alice), "/tasks", "POST").await;
        assert_eq!(evaluation.verdict().map(|v| v.limit), Some(10));
    }

    #[tokio::test]
    async fn test_user_limit_overrides_role_until_disabled() {
        let h = Harness::new();
        let bob = user(Role::Manager);
        h.config
            .update_role_limit(h.admin, Role::Manager, values(50, 3600))
            .await
            .unwrap();
        h.config
            .set_user_limit(h.admin, bob.id, values(3, 60))
            .await
            .unwrap();

        for endpoint in ["/api/tasks", "/api/projects"] {
            let evaluation = h.engine.evaluate(Some(&bob), endpoint, "GET").await;
            assert_eq!(tier_of(&evaluation), Some(Tier::User));
            assert_eq!(evaluation.verdict().map(|v| v.limit), Some(3));
        }

        h.config
            .set_user_limit(
                h.admin,
                bob.id,
                LimitValues {
                    enabled: false,
                    ..values(3, 60)
                },
            )
            .await
            .unwrap();

        let evaluation = h.engine.evaluate(Some(&bob), "/api/tasks", "GET").await;
        assert_eq!(tier_of(&evaluation), Some(Tier::Role));
        assert_eq!(evaluation.verdict().map(|v| v.limit), Some(50));
    }

    #[tokio::test]
    async fn test_missing_role_limit_uses_default() {
        let h = Harness::new();
        let carol = user(Role::Admin);

        let evaluation = h.engine.evaluate(Some(&carol), "/api/tasks", "GET").await;
        let verdict = evaluation.verdict().unwrap();

        assert_eq!(verdict.tier, Tier::Role);
        assert_eq!(verdict.limit, 200);
        assert_eq!(verdict.window_seconds, 3600);
    }

    #[tokio::test]
    async fn test_repeated_identical_update_keeps_enforcement() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .update_role_limit(h.admin, Role::User, values(3, 60))
            .await
            .unwrap();
        h.request(&alice, "/api/tasks", "GET").await;
        let before = h.engine.evaluate(Some(&alice), "/api/tasks", "GET").await;

        h.config
            .update_role_limit(h.admin, Role::User, values(3, 60))
            .await
            .unwrap();
        let after = h.engine.evaluate(Some(&alice), "/api/tasks", "GET").await;

        assert_eq!(before, after);
        assert_eq!(h.config.list_audit_entries(0, 10).await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_anonymous_request_is_not_throttled() {
        let h = Harness::new();
        let evaluation = h.engine.evaluate(None, "/api/tasks", "GET").await;

        assert_eq!(evaluation, Evaluation::Anonymous);
        assert_eq!(evaluation.into_decision(), Decision::Pass(None));
    }

    #[tokio::test]
    async fn test_concurrent_requests_can_overshoot_before_logging() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .update_role_limit(h.admin, Role::User, values(1, 60))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.engine.evaluate(Some(&alice), "/api/tasks", "POST"),
            h.engine.evaluate(Some(&alice), "/api/tasks", "POST"),
        );

        assert!(matches!(a, Evaluation::Allowed(_)));
        assert!(matches!(b, Evaluation::Allowed(_)));
    }

    struct FailingActivityLog;

    #[async_trait]
    impl ActivityLogRepository for FailingActivityLog {
        async fn append(&self, _record: NewActivityRecord) -> Result<()> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn count(&self, _scope: &UsageScope, _window_start: DateTime<Utc>) -> Result<i64> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    struct StalledActivityLog;

    #[async_trait]
    impl ActivityLogRepository for StalledActivityLog {
        async fn append(&self, _record: NewActivityRecord) -> Result<()> {
            Ok(())
        }

        async fn count(&self, _scope: &UsageScope, _window_start: DateTime<Utc>) -> Result<i64> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0)
        }

        async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_count_failure_fails_open() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let h = Harness::with_log(
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(FailingActivityLog),
            clock,
        );

        let evaluation = h
            .engine
            .evaluate(Some(&user(Role::User)), "/api/tasks", "GET")
            .await;

        assert!(matches!(evaluation, Evaluation::EvaluationFailed(_)));
        assert_eq!(evaluation.into_decision(), Decision::Pass(None));
    }

    #[tokio::test]
    async fn test_slow_count_times_out_and_fails_open() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = Arc::new(RateLimitConfigService::new(Arc::new(
            InMemoryRateLimitStore::new(),
        )));
        let counter = Arc::new(UsageCounter::new(Arc::new(StalledActivityLog), clock.clone()));
        let settings = RateLimitSettings {
            evaluation_timeout: Duration::from_millis(20),
            ..RateLimitSettings::default()
        };
        let engine = RateLimitService::new(config, counter, clock, &settings);

        let evaluation = engine
            .evaluate(Some(&user(Role::User)), "/api/tasks", "GET")
            .await;

        assert!(matches!(evaluation, Evaluation::EvaluationFailed(_)));
    }

    #[tokio::test]
    async fn test_usage_reports_follow_resolution() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .update_role_limit(h.admin, Role::User, values(4, 60))
            .await
            .unwrap();
        h.config
            .create_endpoint_limit(h.admin, "/tasks", "*", values(10, 60))
            .await
            .unwrap();
        h.request(&alice, "/tasks", "GET").await;
        h.request(&alice, "/tasks", "POST").await;

        let user_report = h.engine.user_usage(alice.id, Role::User).await.unwrap();
        assert_eq!(user_report.tier, Tier::Role);
        assert_eq!(user_report.snapshot.current_usage, 2);
        assert_eq!(user_report.snapshot.percentage, 50.0);

        let endpoint_report = h.engine.endpoint_usage("/tasks", "*", None).await.unwrap();
        assert_eq!(endpoint_report.tier, Tier::Endpoint);
        assert_eq!(endpoint_report.snapshot.current_usage, 2);

        let missing = h.engine.endpoint_usage("/projects", "GET", None).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_current_verdict_does_not_consume_quota() {
        let h = Harness::new();
        let alice = user(Role::User);
        h.config
            .update_role_limit(h.admin, Role::User, values(3, 60))
            .await
            .unwrap();
        h.request(&alice, "/api/tasks", "GET").await;

        for _ in 0..3 {
            let verdict = h.engine.current_verdict(&alice, None).await.unwrap();
            assert_eq!(verdict.remaining, 1);
        }
        assert_eq!(h.log.len().await, 1);
    }

    #[test]
    fn test_resolution_is_a_pure_priority_function() {
        let user_id = Uuid::new_v4();
        let fallback = (200, 3600);

        let applied = resolve_applicable_limit(user_id, &LimitCandidates::default(), fallback);
        assert_eq!(applied.tier, Tier::Role);
        assert_eq!((applied.limit, applied.window_seconds), fallback);
        assert_eq!(applied.scope, UsageScope::User { user_id });
    }
}
