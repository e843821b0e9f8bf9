use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::Role;
use crate::features::rate_limits::models::{
    AuditAction, AuditEntry, EndpointLimit, LimitValues, NewAuditEntry, NewEndpointLimit,
    RoleLimit, UserLimit,
};
use crate::features::rate_limits::repositories::RateLimitConfigRepository;
use crate::shared::constants::WILDCARD_METHOD;
use crate::shared::validation::{ENDPOINT_PATTERN_REGEX, HTTP_METHOD_REGEX};

fn limit_json(limit: i32, window_seconds: i32, enabled: bool) -> serde_json::Value {
    json!({
        "limit": limit,
        "window_seconds": window_seconds,
        "enabled": enabled,
    })
}

/// Service for managing role, endpoint and user limits.
///
/// Every successful mutation writes exactly one audit entry. Invalid input is
/// rejected before anything reaches the repository.
pub struct RateLimitConfigService {
    repository: Arc<dyn RateLimitConfigRepository>,
}

impl RateLimitConfigService {
    pub fn new(repository: Arc<dyn RateLimitConfigRepository>) -> Self {
        Self { repository }
    }

    fn validate_values(values: &LimitValues) -> Result<()> {
        if values.limit <= 0 {
            return Err(AppError::Validation(
                "limit must be a positive integer".to_string(),
            ));
        }
        if values.window_seconds <= 0 {
            return Err(AppError::Validation(
                "window_seconds must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper-case an HTTP method, keeping the `*` wildcard
    pub fn normalize_method(method: &str) -> Result<String> {
        let method = method.trim();
        if !HTTP_METHOD_REGEX.is_match(method) {
            return Err(AppError::Validation(format!(
                "Invalid method '{}'. Expected an HTTP method or '*'",
                method
            )));
        }
        Ok(method.to_ascii_uppercase())
    }

    fn validate_pattern(pattern: &str) -> Result<String> {
        let pattern = pattern.trim();
        if !ENDPOINT_PATTERN_REGEX.is_match(pattern) {
            return Err(AppError::Validation(format!(
                "Invalid endpoint pattern '{}'. Patterns must start with '/'",
                pattern
            )));
        }
        Ok(pattern.to_string())
    }

    // =========================================================================
    // ROLE LIMITS
    // =========================================================================

    pub async fn list_role_limits(&self) -> Result<Vec<RoleLimit>> {
        self.repository.list_role_limits().await
    }

    pub async fn get_by_role(&self, role: Role) -> Result<Option<RoleLimit>> {
        self.repository.find_role_limit(role).await
    }

    pub async fn update_role_limit(
        &self,
        actor: Uuid,
        role: Role,
        values: LimitValues,
    ) -> Result<RoleLimit> {
        Self::validate_values(&values)?;

        let previous = self.repository.find_role_limit(role).await?;
        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::RoleLimitUpdated,
            target_id: role.to_string(),
            details: json!({
                "role": role,
                "previous": previous.map(|p| limit_json(p.limit, p.window_seconds, p.enabled)),
                "current": values,
            }),
        };

        let limit = self.repository.upsert_role_limit(role, values, audit).await?;
        tracing::info!(
            "Role limit for {} set to {}/{}s (enabled={}) by {}",
            role,
            limit.limit,
            limit.window_seconds,
            limit.enabled,
            actor
        );

        Ok(limit)
    }

    // =========================================================================
    // ENDPOINT LIMITS
    // =========================================================================

    pub async fn list_endpoint_limits(&self) -> Result<Vec<EndpointLimit>> {
        self.repository.list_endpoint_limits().await
    }

    pub async fn get_by_endpoint(
        &self,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<Option<EndpointLimit>> {
        let method = Self::normalize_method(method)?;
        self.repository
            .find_endpoint_limit(endpoint_pattern, &method)
            .await
    }

    pub async fn get_endpoint_limit(&self, id: Uuid) -> Result<EndpointLimit> {
        self.repository
            .find_endpoint_limit_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Endpoint limit '{}' not found", id)))
    }

    /// Specific-method and wildcard entries for a request, in that order
    pub async fn endpoint_candidates(
        &self,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<(Option<EndpointLimit>, Option<EndpointLimit>)> {
        let method = method.to_ascii_uppercase();
        if method == WILDCARD_METHOD {
            let wildcard = self
                .repository
                .find_endpoint_limit(endpoint_pattern, WILDCARD_METHOD)
                .await?;
            return Ok((None, wildcard));
        }

        tokio::try_join!(
            self.repository.find_endpoint_limit(endpoint_pattern, &method),
            self.repository
                .find_endpoint_limit(endpoint_pattern, WILDCARD_METHOD),
        )
    }

    pub async fn create_endpoint_limit(
        &self,
        actor: Uuid,
        endpoint_pattern: &str,
        method: &str,
        values: LimitValues,
    ) -> Result<EndpointLimit> {
        let endpoint_pattern = Self::validate_pattern(endpoint_pattern)?;
        let method = Self::normalize_method(method)?;
        Self::validate_values(&values)?;

        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::EndpointLimitCreated,
            target_id: format!("{} {}", method, endpoint_pattern),
            details: json!({
                "endpoint_pattern": endpoint_pattern,
                "method": method,
                "current": values,
            }),
        };

        let limit = self
            .repository
            .insert_endpoint_limit(
                NewEndpointLimit {
                    endpoint_pattern,
                    method,
                    values,
                },
                audit,
            )
            .await?;

        tracing::info!(
            "Endpoint limit {} {} created ({}/{}s) by {}",
            limit.method,
            limit.endpoint_pattern,
            limit.limit,
            limit.window_seconds,
            actor
        );

        Ok(limit)
    }

    pub async fn update_endpoint_limit(
        &self,
        actor: Uuid,
        id: Uuid,
        values: LimitValues,
    ) -> Result<EndpointLimit> {
        Self::validate_values(&values)?;

        let previous = self.get_endpoint_limit(id).await?;
        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::EndpointLimitUpdated,
            target_id: id.to_string(),
            details: json!({
                "endpoint_pattern": previous.endpoint_pattern,
                "method": previous.method,
                "previous": limit_json(previous.limit, previous.window_seconds, previous.enabled),
                "current": values,
            }),
        };

        let limit = self
            .repository
            .update_endpoint_limit(id, values, audit)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Endpoint limit '{}' not found", id)))?;

        tracing::info!(
            "Endpoint limit {} {} updated to {}/{}s (enabled={}) by {}",
            limit.method,
            limit.endpoint_pattern,
            limit.limit,
            limit.window_seconds,
            limit.enabled,
            actor
        );

        Ok(limit)
    }

    pub async fn delete_endpoint_limit(&self, actor: Uuid, id: Uuid) -> Result<()> {
        let previous = self.get_endpoint_limit(id).await?;
        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::EndpointLimitDeleted,
            target_id: id.to_string(),
            details: json!({
                "endpoint_pattern": previous.endpoint_pattern,
                "method": previous.method,
                "previous": limit_json(previous.limit, previous.window_seconds, previous.enabled),
            }),
        };

        if !self.repository.delete_endpoint_limit(id, audit).await? {
            return Err(AppError::NotFound(format!(
                "Endpoint limit '{}' not found",
                id
            )));
        }

        tracing::info!(
            "Endpoint limit {} {} deleted by {}",
            previous.method,
            previous.endpoint_pattern,
            actor
        );

        Ok(())
    }

    // =========================================================================
    // USER LIMITS
    // =========================================================================

    pub async fn list_user_limits(&self) -> Result<Vec<UserLimit>> {
        self.repository.list_user_limits().await
    }

    pub async fn get_by_user(&self, user_id: Uuid) -> Result<Option<UserLimit>> {
        self.repository.find_user_limit(user_id).await
    }

    pub async fn set_user_limit(
        &self,
        actor: Uuid,
        user_id: Uuid,
        values: LimitValues,
    ) -> Result<UserLimit> {
        Self::validate_values(&values)?;

        let previous = self.repository.find_user_limit(user_id).await?;
        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::UserLimitSet,
            target_id: user_id.to_string(),
            details: json!({
                "previous": previous.map(|p| limit_json(p.limit, p.window_seconds, p.enabled)),
                "current": values,
            }),
        };

        let limit = self
            .repository
            .upsert_user_limit(user_id, values, audit)
            .await?;

        tracing::info!(
            "User limit for {} set to {}/{}s (enabled={}) by {}",
            user_id,
            limit.limit,
            limit.window_seconds,
            limit.enabled,
            actor
        );

        Ok(limit)
    }

    pub async fn remove_user_limit(&self, actor: Uuid, user_id: Uuid) -> Result<()> {
        let previous = self
            .repository
            .find_user_limit(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No limit for user '{}'", user_id)))?;

        let audit = NewAuditEntry {
            admin_id: actor,
            action: AuditAction::UserLimitRemoved,
            target_id: user_id.to_string(),
            details: json!({
                "previous": limit_json(previous.limit, previous.window_seconds, previous.enabled),
            }),
        };

        if !self.repository.delete_user_limit(user_id, audit).await? {
            return Err(AppError::NotFound(format!(
                "No limit for user '{}'",
                user_id
            )));
        }

        tracing::info!("User limit for {} removed by {}", user_id, actor);
        Ok(())
    }

    // =========================================================================
    // AUDIT LOG
    // =========================================================================

    pub async fn list_audit_entries(&self, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)> {
        self.repository.list_audit_entries(offset, limit).await
    }
}
