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
use crate::features::auth::model::Role;
use crate::features::rate_limits::dtos::{
    AuditEntryResponseDto, CreateEndpointLimitDto, EndpointLimitResponseDto, RoleLimitResponseDto,
    SetUserLimitDto, UpdateEndpointLimitDto, UpdateRoleLimitDto, UserLimitResponseDto,
};
use crate::shared::types::{ApiResponse, Meta, PaginationQuery};

fn validate<T: Validate>(dto: &T) -> Result<()> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))
}

fn parse_role(role: &str) -> Result<Role> {
    Role::from_str(role).map_err(AppError::Validation)
}

// =============================================================================
// ROLE LIMITS
// =============================================================================

/// List role limits
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/roles",
    responses(
        (status = 200, description = "Role limits", body = ApiResponse<Vec<RoleLimitResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn list_role_limits(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
) -> Result<Json<ApiResponse<Vec<RoleLimitResponseDto>>>> {
    let limits = state.config_service.list_role_limits().await?;
    let response: Vec<RoleLimitResponseDto> = limits.into_iter().map(|l| l.into()).collect();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Get the limit for one role
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/roles/{role}",
    params(("role" = String, Path, description = "ADMIN, MANAGER or USER")),
    responses(
        (status = 200, description = "Role limit", body = ApiResponse<RoleLimitResponseDto>),
        (status = 400, description = "Unknown role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "No limit configured for role")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_role_limit(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(role): Path<String>,
) -> Result<Json<ApiResponse<RoleLimitResponseDto>>> {
    let role = parse_role(&role)?;
    let limit = state
        .config_service
        .get_by_role(role)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No rate limit configured for role {}", role)))?;

    Ok(Json(ApiResponse::success(Some(limit.into()), None, None)))
}

/// Create or replace the limit for a role
#[utoipa::path(
    put,
    path = "/api/admin/rate-limits/roles/{role}",
    params(("role" = String, Path, description = "ADMIN, MANAGER or USER")),
    request_body = UpdateRoleLimitDto,
    responses(
        (status = 200, description = "Updated role limit", body = ApiResponse<RoleLimitResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn update_role_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(role): Path<String>,
    AppJson(dto): AppJson<UpdateRoleLimitDto>,
) -> Result<Json<ApiResponse<RoleLimitResponseDto>>> {
    validate(&dto)?;
    let role = parse_role(&role)?;

    let limit = state
        .config_service
        .update_role_limit(user.id, role, dto.into())
        .await?;

    Ok(Json(ApiResponse::success(
        Some(limit.into()),
        Some("Role limit updated".to_string()),
        None,
    )))
}

// =============================================================================
// ENDPOINT LIMITS
// =============================================================================

/// List endpoint limits
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/endpoints",
    responses(
        (status = 200, description = "Endpoint limits", body = ApiResponse<Vec<EndpointLimitResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn list_endpoint_limits(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
) -> Result<Json<ApiResponse<Vec<EndpointLimitResponseDto>>>> {
    let limits = state.config_service.list_endpoint_limits().await?;
    let response: Vec<EndpointLimitResponseDto> = limits.into_iter().map(|l| l.into()).collect();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Create an endpoint limit
#[utoipa::path(
    post,
    path = "/api/admin/rate-limits/endpoints",
    request_body = CreateEndpointLimitDto,
    responses(
        (status = 201, description = "Endpoint limit created", body = ApiResponse<EndpointLimitResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 409, description = "A limit for this pattern and method already exists")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn create_endpoint_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    AppJson(dto): AppJson<CreateEndpointLimitDto>,
) -> Result<(
    axum::http::StatusCode,
    Json<ApiResponse<EndpointLimitResponseDto>>,
)> {
    validate(&dto)?;

    let limit = state
        .config_service
        .create_endpoint_limit(user.id, &dto.endpoint_pattern, &dto.method, dto.values())
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(limit.into()),
            Some("Endpoint limit created".to_string()),
            None,
        )),
    ))
}

/// Get an endpoint limit
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Endpoint limit ID")),
    responses(
        (status = 200, description = "Endpoint limit", body = ApiResponse<EndpointLimitResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "Endpoint limit not found")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_endpoint_limit(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<EndpointLimitResponseDto>>> {
    let limit = state.config_service.get_endpoint_limit(id).await?;

    Ok(Json(ApiResponse::success(Some(limit.into()), None, None)))
}

/// Update the values of an endpoint limit
#[utoipa::path(
    put,
    path = "/api/admin/rate-limits/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Endpoint limit ID")),
    request_body = UpdateEndpointLimitDto,
    responses(
        (status = 200, description = "Updated endpoint limit", body = ApiResponse<EndpointLimitResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "Endpoint limit not found")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn update_endpoint_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(id): Path<Uuid>,
    AppJson(dto): AppJson<UpdateEndpointLimitDto>,
) -> Result<Json<ApiResponse<EndpointLimitResponseDto>>> {
    validate(&dto)?;

    let limit = state
        .config_service
        .update_endpoint_limit(user.id, id, dto.into())
        .await?;

    Ok(Json(ApiResponse::success(
        Some(limit.into()),
        Some("Endpoint limit updated".to_string()),
        None,
    )))
}

/// Delete an endpoint limit
#[utoipa::path(
    delete,
    path = "/api/admin/rate-limits/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Endpoint limit ID")),
    responses(
        (status = 200, description = "Endpoint limit deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "Endpoint limit not found")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn delete_endpoint_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>> {
    state.config_service.delete_endpoint_limit(user.id, id).await?;

    Ok(Json(ApiResponse::success(
        None,
        Some("Endpoint limit deleted".to_string()),
        None,
    )))
}

// =============================================================================
// USER LIMITS
// =============================================================================

/// List per-user overrides
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/users",
    responses(
        (status = 200, description = "User limits", body = ApiResponse<Vec<UserLimitResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn list_user_limits(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
) -> Result<Json<ApiResponse<Vec<UserLimitResponseDto>>>> {
    let limits = state.config_service.list_user_limits().await?;
    let response: Vec<UserLimitResponseDto> = limits.into_iter().map(|l| l.into()).collect();

    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Get the override for one user
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User limit", body = ApiResponse<UserLimitResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "No override for user")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn get_user_limit(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserLimitResponseDto>>> {
    let limit = state
        .config_service
        .get_by_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No rate limit override for user {}", user_id)))?;

    Ok(Json(ApiResponse::success(Some(limit.into()), None, None)))
}

/// Create or replace the override for a user
#[utoipa::path(
    put,
    path = "/api/admin/rate-limits/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = SetUserLimitDto,
    responses(
        (status = 200, description = "User limit set", body = ApiResponse<UserLimitResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn set_user_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(user_id): Path<Uuid>,
    AppJson(dto): AppJson<SetUserLimitDto>,
) -> Result<Json<ApiResponse<UserLimitResponseDto>>> {
    validate(&dto)?;

    let limit = state
        .config_service
        .set_user_limit(user.id, user_id, dto.into())
        .await?;

    Ok(Json(ApiResponse::success(
        Some(limit.into()),
        Some("User limit set".to_string()),
        None,
    )))
}

/// Remove the override for a user
#[utoipa::path(
    delete,
    path = "/api/admin/rate-limits/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User limit removed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "No override for user")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn remove_user_limit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<RateLimitState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>> {
    state.config_service.remove_user_limit(user.id, user_id).await?;

    Ok(Json(ApiResponse::success(
        None,
        Some("User limit removed".to_string()),
        None,
    )))
}

// =============================================================================
// AUDIT
// =============================================================================

/// List configuration changes, newest first
#[utoipa::path(
    get,
    path = "/api/admin/rate-limits/audit-logs",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Audit entries", body = ApiResponse<Vec<AuditEntryResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required")
    ),
    tag = "rate-limits",
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<RateLimitState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntryResponseDto>>>> {
    let (entries, total) = state
        .config_service
        .list_audit_entries(query.offset(), query.limit())
        .await?;
    let response: Vec<AuditEntryResponseDto> = entries.into_iter().map(|e| e.into()).collect();

    Ok(Json(ApiResponse::success(
        Some(response),
        None,
        Some(Meta { total }),
    )))
}
