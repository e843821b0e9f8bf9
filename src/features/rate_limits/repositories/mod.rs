//! Storage seams for the throttler.
//!
//! Configuration and its audit trail share one repository so a change and its
//! audit entry are written together. The activity log is separate: it is
//! appended by the logging middleware and read by the usage counter.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::auth::model::Role;
use crate::features::rate_limits::models::{
    AuditEntry, EndpointLimit, LimitValues, NewActivityRecord, NewAuditEntry, NewEndpointLimit,
    RoleLimit, UsageScope, UserLimit,
};

pub use memory::{InMemoryActivityLog, InMemoryRateLimitStore};
pub use postgres::{PgActivityLogRepository, PgRateLimitConfigRepository};

#[async_trait]
pub trait RateLimitConfigRepository: Send + Sync {
    async fn list_role_limits(&self) -> Result<Vec<RoleLimit>>;

    async fn find_role_limit(&self, role: Role) -> Result<Option<RoleLimit>>;

    /// Insert or replace the limit for a role
    async fn upsert_role_limit(
        &self,
        role: Role,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<RoleLimit>;

    async fn list_endpoint_limits(&self) -> Result<Vec<EndpointLimit>>;

    async fn find_endpoint_limit(
        &self,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<Option<EndpointLimit>>;

    async fn find_endpoint_limit_by_id(&self, id: Uuid) -> Result<Option<EndpointLimit>>;

    /// Fails with `Conflict` when the (pattern, method) pair already exists
    async fn insert_endpoint_limit(
        &self,
        new: NewEndpointLimit,
        audit: NewAuditEntry,
    ) -> Result<EndpointLimit>;

    /// Returns `None` (and writes no audit entry) when the id is unknown
    async fn update_endpoint_limit(
        &self,
        id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<Option<EndpointLimit>>;

    async fn delete_endpoint_limit(&self, id: Uuid, audit: NewAuditEntry) -> Result<bool>;

    async fn list_user_limits(&self) -> Result<Vec<UserLimit>>;

    async fn find_user_limit(&self, user_id: Uuid) -> Result<Option<UserLimit>>;

    async fn upsert_user_limit(
        &self,
        user_id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<UserLimit>;

    async fn delete_user_limit(&self, user_id: Uuid, audit: NewAuditEntry) -> Result<bool>;

    /// Newest first, with the total number of entries
    async fn list_audit_entries(&self, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)>;
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, record: NewActivityRecord) -> Result<()>;

    /// Records in `scope` with `timestamp >= window_start`
    async fn count(&self, scope: &UsageScope, window_start: DateTime<Utc>) -> Result<i64>;

    /// Deletes records with `timestamp < cutoff`, returning how many were removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
