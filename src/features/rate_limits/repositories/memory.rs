use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ActivityLogRepository, RateLimitConfigRepository};
use crate::core::error::{AppError, Result};
use crate::features::auth::model::Role;
use crate::features::rate_limits::models::{
    ActivityRecord, AuditEntry, EndpointLimit, LimitValues, MethodFilter, NewActivityRecord,
    NewAuditEntry, NewEndpointLimit, RoleLimit, UsageScope, UserLimit,
};

#[derive(Default)]
struct ConfigState {
    roles: HashMap<Role, RoleLimit>,
    endpoints: HashMap<Uuid, EndpointLimit>,
    users: HashMap<Uuid, UserLimit>,
    audit: Vec<AuditEntry>,
}

impl ConfigState {
    fn push_audit(&mut self, audit: NewAuditEntry) {
        self.audit.push(AuditEntry {
            id: Uuid::new_v4(),
            admin_id: audit.admin_id,
            action: audit.action.as_str().to_string(),
            target_id: audit.target_id,
            details: audit.details,
            created_at: Utc::now(),
        });
    }
}

/// Process-local limit configuration and audit log
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    state: RwLock<ConfigState>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitConfigRepository for InMemoryRateLimitStore {
    async fn list_role_limits(&self) -> Result<Vec<RoleLimit>> {
        let state = self.state.read().await;
        let mut limits: Vec<RoleLimit> = state.roles.values().cloned().collect();
        limits.sort_by_key(|l| l.role.as_str());
        Ok(limits)
    }

    async fn find_role_limit(&self, role: Role) -> Result<Option<RoleLimit>> {
        Ok(self.state.read().await.roles.get(&role).cloned())
    }

    async fn upsert_role_limit(
        &self,
        role: Role,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<RoleLimit> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let limit = match state.roles.get(&role) {
            Some(existing) => RoleLimit {
                limit: values.limit,
                window_seconds: values.window_seconds,
                enabled: values.enabled,
                updated_at: now,
                ..existing.clone()
            },
            None => RoleLimit {
                id: Uuid::new_v4(),
                role,
                limit: values.limit,
                window_seconds: values.window_seconds,
                enabled: values.enabled,
                created_at: now,
                updated_at: now,
            },
        };

        state.roles.insert(role, limit.clone());
        state.push_audit(audit);
        Ok(limit)
    }

    async fn list_endpoint_limits(&self) -> Result<Vec<EndpointLimit>> {
        let state = self.state.read().await;
        let mut limits: Vec<EndpointLimit> = state.endpoints.values().cloned().collect();
        limits.sort_by(|a, b| {
            (&a.endpoint_pattern, &a.method).cmp(&(&b.endpoint_pattern, &b.method))
        });
        Ok(limits)
    }

    async fn find_endpoint_limit(
        &self,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<Option<EndpointLimit>> {
        let state = self.state.read().await;
        Ok(state
            .endpoints
            .values()
            .find(|l| l.endpoint_pattern == endpoint_pattern && l.method == method)
            .cloned())
    }

    async fn find_endpoint_limit_by_id(&self, id: Uuid) -> Result<Option<EndpointLimit>> {
        Ok(self.state.read().await.endpoints.get(&id).cloned())
    }

    async fn insert_endpoint_limit(
        &self,
        new: NewEndpointLimit,
        audit: NewAuditEntry,
    ) -> Result<EndpointLimit> {
        let mut state = self.state.write().await;

        let exists = state
            .endpoints
            .values()
            .any(|l| l.endpoint_pattern == new.endpoint_pattern && l.method == new.method);
        if exists {
            return Err(AppError::Conflict(format!(
                "Endpoint limit for {} {} already exists",
                new.method, new.endpoint_pattern
            )));
        }

        let now = Utc::now();
        let limit = EndpointLimit {
            id: Uuid::new_v4(),
            endpoint_pattern: new.endpoint_pattern,
            method: new.method,
            limit: new.values.limit,
            window_seconds: new.values.window_seconds,
            enabled: new.values.enabled,
            created_at: now,
            updated_at: now,
        };

        state.endpoints.insert(limit.id, limit.clone());
        state.push_audit(audit);
        Ok(limit)
    }

    async fn update_endpoint_limit(
        &self,
        id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<Option<EndpointLimit>> {
        let mut state = self.state.write().await;

        let Some(limit) = state.endpoints.get_mut(&id) else {
            return Ok(None);
        };
        limit.limit = values.limit;
        limit.window_seconds = values.window_seconds;
        limit.enabled = values.enabled;
        limit.updated_at = Utc::now();
        let updated = limit.clone();

        state.push_audit(audit);
        Ok(Some(updated))
    }

    async fn delete_endpoint_limit(&self, id: Uuid, audit: NewAuditEntry) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.endpoints.remove(&id).is_none() {
            return Ok(false);
        }
        state.push_audit(audit);
        Ok(true)
    }

    async fn list_user_limits(&self) -> Result<Vec<UserLimit>> {
        let state = self.state.read().await;
        let mut limits: Vec<UserLimit> = state.users.values().cloned().collect();
        limits.sort_by_key(|l| l.created_at);
        Ok(limits)
    }

    async fn find_user_limit(&self, user_id: Uuid) -> Result<Option<UserLimit>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn upsert_user_limit(
        &self,
        user_id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<UserLimit> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let limit = match state.users.get(&user_id) {
            Some(existing) => UserLimit {
                limit: values.limit,
                window_seconds: values.window_seconds,
                enabled: values.enabled,
                updated_at: now,
                ..existing.clone()
            },
            None => UserLimit {
                id: Uuid::new_v4(),
                user_id,
                limit: values.limit,
                window_seconds: values.window_seconds,
                enabled: values.enabled,
                created_at: now,
                updated_at: now,
            },
        };

        state.users.insert(user_id, limit.clone());
        state.push_audit(audit);
        Ok(limit)
    }

    async fn delete_user_limit(&self, user_id: Uuid, audit: NewAuditEntry) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        state.push_audit(audit);
        Ok(true)
    }

    async fn list_audit_entries(&self, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)> {
        let state = self.state.read().await;
        let total = state.audit.len() as i64;
        let entries = state
            .audit
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((entries, total))
    }
}

#[derive(Default)]
struct ActivityState {
    records: Vec<ActivityRecord>,
}

/// Process-local activity log
#[derive(Default)]
pub struct InMemoryActivityLog {
    state: RwLock<ActivityState>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }
}

fn in_scope(record: &ActivityRecord, scope: &UsageScope) -> bool {
    match scope {
        UsageScope::User { user_id } => record.user_id == Some(*user_id),
        UsageScope::Endpoint {
            pattern,
            method,
            user_id,
        } => {
            let method_matches = match method {
                MethodFilter::Any => true,
                MethodFilter::Exact(m) => record.method == *m,
            };
            let user_matches = user_id.map_or(true, |id| record.user_id == Some(id));
            record.endpoint == *pattern && method_matches && user_matches
        }
    }
}

#[async_trait]
impl ActivityLogRepository for InMemoryActivityLog {
    async fn append(&self, record: NewActivityRecord) -> Result<()> {
        self.state.write().await.records.push(ActivityRecord {
            user_id: record.user_id,
            endpoint: record.endpoint,
            method: record.method,
            timestamp: record.timestamp,
        });
        Ok(())
    }

    async fn count(&self, scope: &UsageScope, window_start: DateTime<Utc>) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .records
            .iter()
            .filter(|r| r.timestamp >= window_start && in_scope(r, scope))
            .count();
        Ok(count as i64)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|r| r.timestamp >= cutoff);
        Ok((before - state.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rate_limits::models::AuditAction;

    fn audit(action: AuditAction) -> NewAuditEntry {
        NewAuditEntry {
            admin_id: Uuid::new_v4(),
            action,
            target_id: "target".to_string(),
            details: serde_json::json!({}),
        }
    }

    fn values(limit: i32) -> LimitValues {
        LimitValues {
            limit,
            window_seconds: 60,
            enabled: true,
        }
    }

    fn record(user_id: Option<Uuid>, endpoint: &str, method: &str, at: DateTime<Utc>) -> NewActivityRecord {
        NewActivityRecord {
            user_id,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            status_code: 200,
            response_time_ms: 3,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_duplicate_endpoint_limit_conflicts_without_audit() {
        let store = InMemoryRateLimitStore::new();
        let new = NewEndpointLimit {
            endpoint_pattern: "/tasks".to_string(),
            method: "POST".to_string(),
            values: values(2),
        };

        store
            .insert_endpoint_limit(new.clone(), audit(AuditAction::EndpointLimitCreated))
            .await
            .unwrap();
        let result = store
            .insert_endpoint_limit(new, audit(AuditAction::EndpointLimitCreated))
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let (_, total) = store.list_audit_entries(0, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_upsert_role_keeps_one_row_per_role() {
        let store = InMemoryRateLimitStore::new();
        store
            .upsert_role_limit(Role::User, values(5), audit(AuditAction::RoleLimitUpdated))
            .await
            .unwrap();
        store
            .upsert_role_limit(Role::User, values(7), audit(AuditAction::RoleLimitUpdated))
            .await
            .unwrap();

        let limits = store.list_role_limits().await.unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0].limit, 7);
    }

    #[tokio::test]
    async fn test_count_respects_scope_and_window() {
        let log = InMemoryActivityLog::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();

        log.append(record(Some(user), "/tasks", "POST", now)).await.unwrap();
        log.append(record(Some(user), "/tasks", "GET", now)).await.unwrap();
        log.append(record(Some(other), "/tasks", "POST", now)).await.unwrap();
        log.append(record(Some(user), "/tasks", "POST", now - chrono::Duration::seconds(120)))
            .await
            .unwrap();

        let window_start = now - chrono::Duration::seconds(60);
        let exact = UsageScope::Endpoint {
            pattern: "/tasks".to_string(),
            method: MethodFilter::Exact("POST".to_string()),
            user_id: Some(user),
        };
        let any_method = UsageScope::Endpoint {
            pattern: "/tasks".to_string(),
            method: MethodFilter::Any,
            user_id: Some(user),
        };
        let everyone = UsageScope::Endpoint {
            pattern: "/tasks".to_string(),
            method: MethodFilter::Any,
            user_id: None,
        };

        assert_eq!(log.count(&exact, window_start).await.unwrap(), 1);
        assert_eq!(log.count(&any_method, window_start).await.unwrap(), 2);
        assert_eq!(log.count(&everyone, window_start).await.unwrap(), 3);
        assert_eq!(
            log.count(&UsageScope::User { user_id: user }, window_start)
                .await
                .unwrap(),
            2
        );
    }
}
