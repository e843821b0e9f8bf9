use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::RateLimitState;
use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::auth::guards::RequireAdmin;
use crate::features::auth::model::{AuthenticatedUser, Role};
use crate::features::rate_limits::dtos::{
    EndpointUsageQuery, RateLimitStatusDto, RateLimitStatusQuery, RetentionStatusDto,
    RetentionSweepResponseDto, TriggerRetentionSweepDto, UsageResponseDto, UserUsageQuery,
};
use crate::shared::constants::WILDCARD_METHOD;
use crate::shared::types::ApiResponse;

/// Usage of the limit that applies to a user
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/usage/users/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        UserUsageQuery
    ),
    responses(
        (status = 200, description = "Current usage", body = ApiResponse<UsageResponseDto>),
        (status = 400, description = "Unknown role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_user_usage(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UserUsageQuery>,
) -> Result<Json<ApiResponse<UsageResponseDto>>> {
    let role = Role::from_str(&query.role).map_err(AppError::Validation)?;
    let report = state.rate_limit_service.user_usage(user_id, role).await?;

    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}

/// Usage of an endpoint limit, overall or for one user
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/usage/endpoints",
    params(EndpointUsageQuery),
    responses(
        (status = 200, description = "Current usage", body = ApiResponse<UsageResponseDto>),
        (status = 400, description = "Invalid method"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "No limit configured for the endpoint")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_endpoint_usage(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Query(query): Query<EndpointUsageQuery>,
) -> Result<Json<ApiResponse<UsageResponseDto>>> {
    let method = query.method.as_deref().unwrap_or(WILDCARD_METHOD);
    let report = state
        .rate_limit_service
        .endpoint_usage(&query.pattern, method, query.user_id)
        .await?;

    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}

/// Retention period and the most recent sweep
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/retention",
    responses(
        (status = 200, description = "Retention status", body = ApiResponse<RetentionStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_retention_status(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
) -> Result<Json<ApiResponse<RetentionStatusDto>>> {
    let status = RetentionStatusDto {
        retention_days: state.retention_service.default_days(),
        last_run: state.retention_service.last_run().await.map(Into::into),
    };

    Ok(Json(ApiResponse::success(Some(status), None, None)))
}

/// Delete expired activity records now
#[utoipa::path(
    post,
    path = "/api/admin/rate-limits/retention",
    request_body = TriggerRetentionSweepDto,
    responses(
        (status = 200, description = "Sweep finished", body = ApiResponse<RetentionSweepResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn trigger_retention_sweep(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    AppJson(dto): AppJson<TriggerRetentionSweepDto>,
) -> Result<Json<ApiResponse<RetentionSweepResponseDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let result = state.retention_service.sweep(dto.days).await?;
    tracing::info!("Retention sweep triggered by {}", user.id);

    Ok(Json(ApiResponse::success(Some(result.into()), None, None)))
}

/// Current rate limit standing of the caller. Does not count as a request.
#[utoipa::path(
    get,
    path = "/api/rate-limit/status",
    params(RateLimitStatusQuery),
    responses(
        (status = 200, description = "Caller's rate limit status", body = ApiResponse<RateLimitStatusDto>),
        (status = 400, description = "Invalid method"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_rate_limit_status(
    user: AuthenticatedUser,
    State(state): State<RateLimitState>,
    Query(query): Query<RateLimitStatusQuery>,
) -> Result<Json<ApiResponse<RateLimitStatusDto>>> {
    let method = query.method.as_deref().unwrap_or("GET");
    let endpoint = query.endpoint.as_deref().map(|pattern| (pattern, method));

    let verdict = state
        .rate_limit_service
        .current_verdict(&user, endpoint)
        .await?;

    Ok(Json(ApiResponse::success(Some(verdict.into()), None, None)))
}
