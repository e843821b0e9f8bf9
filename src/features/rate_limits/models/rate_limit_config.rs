use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::features::auth::model::Role;
use crate::shared::constants::WILDCARD_METHOD;

/// Limit applied to every identity holding a role
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RoleLimit {
    pub id: Uuid,
    pub role: Role,
    #[sqlx(rename = "max_requests")]
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Limit attached to a route pattern, for one method or all of them (`*`)
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EndpointLimit {
    pub id: Uuid,
    pub endpoint_pattern: String,
    pub method: String,
    #[sqlx(rename = "max_requests")]
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EndpointLimit {
    pub fn is_wildcard(&self) -> bool {
        self.method == WILDCARD_METHOD
    }
}

/// Per-user override of the role limit
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserLimit {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "max_requests")]
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated limit values shared by all three configuration kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitValues {
    pub limit: i32,
    pub window_seconds: i32,
    pub enabled: bool,
}

/// Data for creating an endpoint limit
#[derive(Debug, Clone)]
pub struct NewEndpointLimit {
    pub endpoint_pattern: String,
    /// Upper-cased HTTP method or `*`
    pub method: String,
    pub values: LimitValues,
}
