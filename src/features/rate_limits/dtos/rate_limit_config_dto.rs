use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::features::auth::model::Role;
use crate::features::rate_limits::models::{
    AuditEntry, EndpointLimit, LimitValues, RoleLimit, UserLimit,
};
use crate::shared::validation::{ENDPOINT_PATTERN_REGEX, HTTP_METHOD_REGEX};

fn default_enabled() -> bool {
    true
}

// =============================================================================
// RESPONSES
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleLimitResponseDto {
    pub id: Uuid,
    pub role: Role,
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleLimit> for RoleLimitResponseDto {
    fn from(limit: RoleLimit) -> Self {
        Self {
            id: limit.id,
            role: limit.role,
            limit: limit.limit,
            window_seconds: limit.window_seconds,
            enabled: limit.enabled,
            updated_at: limit.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EndpointLimitResponseDto {
    pub id: Uuid,
    pub endpoint_pattern: String,
    /// HTTP method, or `*` for every method
    pub method: String,
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EndpointLimit> for EndpointLimitResponseDto {
    fn from(limit: EndpointLimit) -> Self {
        Self {
            id: limit.id,
            endpoint_pattern: limit.endpoint_pattern,
            method: limit.method,
            limit: limit.limit,
            window_seconds: limit.window_seconds,
            enabled: limit.enabled,
            created_at: limit.created_at,
            updated_at: limit.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserLimitResponseDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserLimit> for UserLimitResponseDto {
    fn from(limit: UserLimit) -> Self {
        Self {
            id: limit.id,
            user_id: limit.user_id,
            limit: limit.limit,
            window_seconds: limit.window_seconds,
            enabled: limit.enabled,
            created_at: limit.created_at,
            updated_at: limit.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditEntryResponseDto {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_id: String,
    /// Previous and current values of the changed entry
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryResponseDto {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            admin_id: entry.admin_id,
            action: entry.action,
            target_id: entry.target_id,
            details: entry.details,
            created_at: entry.created_at,
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Limit values accepted by every upsert endpoint
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LimitValuesDto {
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: i32,

    #[validate(range(min = 1, message = "window_seconds must be at least 1"))]
    pub window_seconds: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl From<LimitValuesDto> for LimitValues {
    fn from(dto: LimitValuesDto) -> Self {
        Self {
            limit: dto.limit,
            window_seconds: dto.window_seconds,
            enabled: dto.enabled,
        }
    }
}

pub type UpdateRoleLimitDto = LimitValuesDto;
pub type SetUserLimitDto = LimitValuesDto;
pub type UpdateEndpointLimitDto = LimitValuesDto;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEndpointLimitDto {
    #[validate(regex(
        path = *ENDPOINT_PATTERN_REGEX,
        message = "endpoint_pattern must start with '/'"
    ))]
    pub endpoint_pattern: String,

    /// HTTP method, or `*` for every method
    #[validate(regex(path = *HTTP_METHOD_REGEX, message = "method must be an HTTP method or '*'"))]
    pub method: String,

    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: i32,

    #[validate(range(min = 1, message = "window_seconds must be at least 1"))]
    pub window_seconds: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CreateEndpointLimitDto {
    pub fn values(&self) -> LimitValues {
        LimitValues {
            limit: self.limit,
            window_seconds: self.window_seconds,
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_values_reject_zero_and_default_enabled() {
        let dto: LimitValuesDto =
            serde_json::from_str(r#"{"limit": 0, "window_seconds": 60}"#).unwrap();
        assert!(dto.enabled);
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_create_endpoint_limit_validates_pattern_and_method() {
        let dto = CreateEndpointLimitDto {
            endpoint_pattern: "tasks".to_string(),
            method: "FETCH".to_string(),
            limit: 2,
            window_seconds: 60,
            enabled: true,
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("endpoint_pattern"));
        assert!(fields.contains_key("method"));

        let valid = CreateEndpointLimitDto {
            endpoint_pattern: "/tasks".to_string(),
            method: "post".to_string(),
            ..dto
        };
        assert!(valid.validate().is_ok());
    }
}
