//! Admission gate and activity logging for throttled routes.
//!
//! Both are installed with `route_layer` so the matched route template is
//! available. Order on a router, innermost first: `throttle_middleware`,
//! `activity_logging_middleware`, then authentication. Activity logging sits
//! outside the gate so denied requests are recorded with their 429 status.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::features::auth::model::AuthenticatedUser;
use crate::features::rate_limits::annotator;
use crate::features::rate_limits::models::Decision;
use crate::features::rate_limits::services::{ActivityService, RateLimitService};

fn endpoint_of(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

/// Evaluate the request and either reject it or annotate the handler's response
pub async fn throttle_middleware(
    State(engine): State<Arc<RateLimitService>>,
    req: Request,
    next: Next,
) -> Response {
    let endpoint = endpoint_of(&req);
    let method = req.method().as_str().to_string();
    let identity = req.extensions().get::<AuthenticatedUser>().cloned();

    let evaluation = engine.evaluate(identity.as_ref(), &endpoint, &method).await;
    if let Some(verdict) = evaluation.verdict() {
        tracing::debug!(
            tier = %verdict.tier,
            remaining = verdict.remaining,
            "Rate limit verdict for {} {}",
            method,
            endpoint
        );
    }

    match evaluation.into_decision() {
        Decision::Reject(verdict) => annotator::rejection(&verdict),
        Decision::Pass(verdict) => {
            let mut response = next.run(req).await;
            if let Some(verdict) = verdict {
                annotator::annotate(response.headers_mut(), &verdict);
            }
            response
        }
    }
}

/// Record every completed request after the response is produced
pub async fn activity_logging_middleware(
    State(activity): State<Arc<ActivityService>>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let timestamp = Utc::now();
    let endpoint = endpoint_of(&req);
    let method = req.method().as_str().to_string();
    let user_id = req.extensions().get::<AuthenticatedUser>().map(|u| u.id);

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    tokio::spawn(async move {
        if let Err(e) = activity
            .record(user_id, &endpoint, &method, status, elapsed_ms, timestamp)
            .await
        {
            tracing::error!("Failed to record activity for {} {}: {}", method, endpoint, e);
        }
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use crate::core::config::RateLimitSettings;
    use crate::features::auth::model::Role;
    use crate::features::rate_limits::models::LimitValues;
    use crate::features::rate_limits::repositories::{
        ActivityLogRepository, InMemoryActivityLog, InMemoryRateLimitStore,
    };
    use crate::features::rate_limits::services::{RateLimitConfigService, UsageCounter};
    use crate::shared::test_helpers::{user_with_role, with_user};
    use axum::{
        http::{HeaderName, StatusCode},
        middleware::from_fn_with_state,
        routing::{get, post},
        Router,
    };
    use axum_test::TestServer;
    use std::time::Duration;
    use uuid::Uuid;

    struct Setup {
        config: Arc<RateLimitConfigService>,
        log: Arc<InMemoryActivityLog>,
        router: Router,
    }

    fn setup() -> Setup {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let log = Arc::new(InMemoryActivityLog::new());
        let config = Arc::new(RateLimitConfigService::new(Arc::new(
            InMemoryRateLimitStore::new(),
        )));
        let counter = Arc::new(UsageCounter::new(log.clone(), clock.clone()));
        let engine = Arc::new(RateLimitService::new(
            config.clone(),
            counter,
            clock,
            &RateLimitSettings::default(),
        ));
        let activity = Arc::new(ActivityService::new(log.clone()));

        let router = Router::new()
            .route("/tasks", post(|| async { "created" }).get(|| async { "listed" }))
            .route("/tasks/{id}", get(|| async { "one" }))
            .route_layer(from_fn_with_state(engine, throttle_middleware))
            .route_layer(from_fn_with_state(activity, activity_logging_middleware));

        Setup {
            config,
            log,
            router,
        }
    }

    /// Activity is written from a spawned task; wait until it lands
    async fn wait_for_records(log: &InMemoryActivityLog, expected: usize) {
        for _ in 0..100 {
            if log.len().await >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} activity records", expected);
    }

    fn values(limit: i32) -> LimitValues {
        LimitValues {
            limit,
            window_seconds: 60,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_allowed_response_is_annotated() {
        let s = setup();
        s.config
            .update_role_limit(Uuid::new_v4(), Role::User, values(5))
            .await
            .unwrap();
        let server = TestServer::new(with_user(s.router, user_with_role(Role::User))).unwrap();

        let response = server.get("/tasks").await;

        response.assert_status_ok();
        response.assert_text("listed");
        assert_eq!(
            response.header(HeaderName::from_static("x-ratelimit-limit")),
            "5"
        );
        assert_eq!(
            response.header(HeaderName::from_static("x-ratelimit-remaining")),
            "4"
        );
        assert_eq!(
            response.header(HeaderName::from_static("x-ratelimit-type")),
            "role"
        );
        assert!(response.headers().contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn test_endpoint_limit_denies_with_payload_and_logs_denial() {
        let s = setup();
        s.config
            .create_endpoint_limit(Uuid::new_v4(), "/tasks", "POST", values(1))
            .await
            .unwrap();
        let server = TestServer::new(with_user(s.router, user_with_role(Role::User))).unwrap();

        server.post("/tasks").await.assert_status_ok();
        wait_for_records(&s.log, 1).await;

        let denied = server.post("/tasks").await;
        denied.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.header(axum::http::header::RETRY_AFTER), "60");

        let body: serde_json::Value = denied.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["tier"], "endpoint");
        assert_eq!(body["endpoint"], "/tasks");
        assert_eq!(body["retryAfter"], 60);

        wait_for_records(&s.log, 2).await;
        let scope = crate::features::rate_limits::models::UsageScope::Endpoint {
            pattern: "/tasks".to_string(),
            method: crate::features::rate_limits::models::MethodFilter::Any,
            user_id: None,
        };
        assert_eq!(s.log.count(&scope, Utc::now() - chrono::Duration::hours(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_activity_uses_route_template() {
        let s = setup();
        let server = TestServer::new(with_user(s.router, user_with_role(Role::Manager))).unwrap();

        server.get("/tasks/42").await.assert_status_ok();
        wait_for_records(&s.log, 1).await;

        let scope = crate::features::rate_limits::models::UsageScope::Endpoint {
            pattern: "/tasks/{id}".to_string(),
            method: crate::features::rate_limits::models::MethodFilter::Exact("GET".to_string()),
            user_id: None,
        };
        assert_eq!(s.log.count(&scope, Utc::now() - chrono::Duration::hours(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_request_passes_without_headers() {
        let s = setup();
        let server = TestServer::new(s.router).unwrap();

        let response = server.get("/tasks").await;

        response.assert_status_ok();
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}
