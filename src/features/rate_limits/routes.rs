use axum::{
    routing::{get, put},
    Router,
};

use super::handlers::{self, RateLimitState};

/// Admin routes for throttling configuration (admin role only).
///
/// The caller applies authentication, throttling and activity logging.
pub fn admin_routes(state: RateLimitState) -> Router {
    Router::new()
        .route(
            "/api/admin/rate-limits/roles",
            get(handlers::list_role_limits),
        )
        .route(
            "/api/admin/rate-limits/roles/{role}",
            get(handlers::get_role_limit).put(handlers::update_role_limit),
        )
        .route(
            "/api/admin/rate-limits/endpoints",
            get(handlers::list_endpoint_limits).post(handlers::create_endpoint_limit),
        )
        .route(
            "/api/admin/rate-limits/endpoints/{id}",
            get(handlers::get_endpoint_limit)
                .put(handlers::update_endpoint_limit)
                .delete(handlers::delete_endpoint_limit),
        )
        .route(
            "/api/admin/rate-limits/users",
            get(handlers::list_user_limits),
        )
        .route(
            "/api/admin/rate-limits/users/{user_id}",
            put(handlers::set_user_limit)
                .get(handlers::get_user_limit)
                .delete(handlers::remove_user_limit),
        )
        .route(
            "/api/admin/rate-limits/usage/users/{user_id}",
            get(handlers::get_user_usage),
        )
        .route(
            "/api/admin/rate-limits/usage/endpoints",
            get(handlers::get_endpoint_usage),
        )
        .route(
            "/api/admin/rate-limits/audit-logs",
            get(handlers::list_audit_logs),
        )
        .route(
            "/api/admin/rate-limits/retention",
            get(handlers::get_retention_status).post(handlers::trigger_retention_sweep),
        )
        .with_state(state)
}

/// Self-service status for authenticated callers. Not throttled or logged.
pub fn routes(state: RateLimitState) -> Router {
    Router::new()
        .route("/api/rate-limit/status", get(handlers::get_rate_limit_status))
        .with_state(state)
}
