use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of configuration change captured in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    RoleLimitUpdated,
    EndpointLimitCreated,
    EndpointLimitUpdated,
    EndpointLimitDeleted,
    UserLimitSet,
    UserLimitRemoved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleLimitUpdated => "role_limit.update",
            AuditAction::EndpointLimitCreated => "endpoint_limit.create",
            AuditAction::EndpointLimitUpdated => "endpoint_limit.update",
            AuditAction::EndpointLimitDeleted => "endpoint_limit.delete",
            AuditAction::UserLimitSet => "user_limit.set",
            AuditAction::UserLimitRemoved => "user_limit.remove",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit log row. Never updated after insert.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit entry to be written together with a configuration change
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub admin_id: Uuid,
    pub action: AuditAction,
    pub target_id: String,
    pub details: serde_json::Value,
}
