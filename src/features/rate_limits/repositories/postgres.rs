use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ActivityLogRepository, RateLimitConfigRepository};
use crate::core::error::{AppError, Result};
use crate::features::auth::model::Role;
use crate::features::rate_limits::models::{
    AuditEntry, EndpointLimit, LimitValues, MethodFilter, NewActivityRecord, NewAuditEntry,
    NewEndpointLimit, RoleLimit, UsageScope, UserLimit,
};

const ROLE_LIMIT_COLUMNS: &str =
    "id, role, max_requests, window_seconds, enabled, created_at, updated_at";
const ENDPOINT_LIMIT_COLUMNS: &str =
    "id, endpoint_pattern, method, max_requests, window_seconds, enabled, created_at, updated_at";
const USER_LIMIT_COLUMNS: &str =
    "id, user_id, max_requests, window_seconds, enabled, created_at, updated_at";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!("Failed to {}: {:?}", context, e);
        AppError::Database(e)
    }
}

async fn insert_audit(tx: &mut Transaction<'_, Postgres>, audit: &NewAuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, admin_id, action, target_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(audit.admin_id)
    .bind(audit.action.as_str())
    .bind(&audit.target_id)
    .bind(&audit.details)
    .execute(&mut **tx)
    .await
    .map_err(db_error("write audit entry"))?;

    Ok(())
}

/// PostgreSQL-backed limit configuration and audit log
pub struct PgRateLimitConfigRepository {
    pool: PgPool,
}

impl PgRateLimitConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitConfigRepository for PgRateLimitConfigRepository {
    async fn list_role_limits(&self) -> Result<Vec<RoleLimit>> {
        sqlx::query_as::<_, RoleLimit>(&format!(
            "SELECT {} FROM role_rate_limits ORDER BY role",
            ROLE_LIMIT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list role limits"))
    }

    async fn find_role_limit(&self, role: Role) -> Result<Option<RoleLimit>> {
        sqlx::query_as::<_, RoleLimit>(&format!(
            "SELECT {} FROM role_rate_limits WHERE role = $1",
            ROLE_LIMIT_COLUMNS
        ))
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get role limit"))
    }

    async fn upsert_role_limit(
        &self,
        role: Role,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<RoleLimit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let limit = sqlx::query_as::<_, RoleLimit>(&format!(
            r#"
            INSERT INTO role_rate_limits (id, role, max_requests, window_seconds, enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (role) DO UPDATE
            SET max_requests = EXCLUDED.max_requests,
                window_seconds = EXCLUDED.window_seconds,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING {}
            "#,
            ROLE_LIMIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(role)
        .bind(values.limit)
        .bind(values.window_seconds)
        .bind(values.enabled)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("upsert role limit"))?;

        insert_audit(&mut tx, &audit).await?;
        tx.commit().await.map_err(db_error("commit role limit"))?;

        Ok(limit)
    }

    async fn list_endpoint_limits(&self) -> Result<Vec<EndpointLimit>> {
        sqlx::query_as::<_, EndpointLimit>(&format!(
            "SELECT {} FROM endpoint_rate_limits ORDER BY endpoint_pattern, method",
            ENDPOINT_LIMIT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list endpoint limits"))
    }

    async fn find_endpoint_limit(
        &self,
        endpoint_pattern: &str,
        method: &str,
    ) -> Result<Option<EndpointLimit>> {
        sqlx::query_as::<_, EndpointLimit>(&format!(
            "SELECT {} FROM endpoint_rate_limits WHERE endpoint_pattern = $1 AND method = $2",
            ENDPOINT_LIMIT_COLUMNS
        ))
        .bind(endpoint_pattern)
        .bind(method)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get endpoint limit"))
    }

    async fn find_endpoint_limit_by_id(&self, id: Uuid) -> Result<Option<EndpointLimit>> {
        sqlx::query_as::<_, EndpointLimit>(&format!(
            "SELECT {} FROM endpoint_rate_limits WHERE id = $1",
            ENDPOINT_LIMIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get endpoint limit by id"))
    }

    async fn insert_endpoint_limit(
        &self,
        new: NewEndpointLimit,
        audit: NewAuditEntry,
    ) -> Result<EndpointLimit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let inserted = sqlx::query_as::<_, EndpointLimit>(&format!(
            r#"
            INSERT INTO endpoint_rate_limits
                (id, endpoint_pattern, method, max_requests, window_seconds, enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ENDPOINT_LIMIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.endpoint_pattern)
        .bind(&new.method)
        .bind(new.values.limit)
        .bind(new.values.window_seconds)
        .bind(new.values.enabled)
        .fetch_one(&mut *tx)
        .await;

        let limit = match inserted {
            Ok(limit) => limit,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AppError::Conflict(format!(
                    "Endpoint limit for {} {} already exists",
                    new.method, new.endpoint_pattern
                )));
            }
            Err(e) => return Err(db_error("create endpoint limit")(e)),
        };

        insert_audit(&mut tx, &audit).await?;
        tx.commit()
            .await
            .map_err(db_error("commit endpoint limit"))?;

        Ok(limit)
    }

    async fn update_endpoint_limit(
        &self,
        id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<Option<EndpointLimit>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let limit = sqlx::query_as::<_, EndpointLimit>(&format!(
            r#"
            UPDATE endpoint_rate_limits
            SET max_requests = $1, window_seconds = $2, enabled = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            ENDPOINT_LIMIT_COLUMNS
        ))
        .bind(values.limit)
        .bind(values.window_seconds)
        .bind(values.enabled)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("update endpoint limit"))?;

        let Some(limit) = limit else {
            return Ok(None);
        };

        insert_audit(&mut tx, &audit).await?;
        tx.commit()
            .await
            .map_err(db_error("commit endpoint limit"))?;

        Ok(Some(limit))
    }

    async fn delete_endpoint_limit(&self, id: Uuid, audit: NewAuditEntry) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let deleted = sqlx::query("DELETE FROM endpoint_rate_limits WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete endpoint limit"))?
            .rows_affected();

        if deleted == 0 {
            return Ok(false);
        }

        insert_audit(&mut tx, &audit).await?;
        tx.commit()
            .await
            .map_err(db_error("commit endpoint limit deletion"))?;

        Ok(true)
    }

    async fn list_user_limits(&self) -> Result<Vec<UserLimit>> {
        sqlx::query_as::<_, UserLimit>(&format!(
            "SELECT {} FROM user_rate_limits ORDER BY created_at",
            USER_LIMIT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list user limits"))
    }

    async fn find_user_limit(&self, user_id: Uuid) -> Result<Option<UserLimit>> {
        sqlx::query_as::<_, UserLimit>(&format!(
            "SELECT {} FROM user_rate_limits WHERE user_id = $1",
            USER_LIMIT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get user limit"))
    }

    async fn upsert_user_limit(
        &self,
        user_id: Uuid,
        values: LimitValues,
        audit: NewAuditEntry,
    ) -> Result<UserLimit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let limit = sqlx::query_as::<_, UserLimit>(&format!(
            r#"
            INSERT INTO user_rate_limits (id, user_id, max_requests, window_seconds, enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET max_requests = EXCLUDED.max_requests,
                window_seconds = EXCLUDED.window_seconds,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING {}
            "#,
            USER_LIMIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(values.limit)
        .bind(values.window_seconds)
        .bind(values.enabled)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("upsert user limit"))?;

        insert_audit(&mut tx, &audit).await?;
        tx.commit().await.map_err(db_error("commit user limit"))?;

        Ok(limit)
    }

    async fn delete_user_limit(&self, user_id: Uuid, audit: NewAuditEntry) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        let deleted = sqlx::query("DELETE FROM user_rate_limits WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete user limit"))?
            .rows_affected();

        if deleted == 0 {
            return Ok(false);
        }

        insert_audit(&mut tx, &audit).await?;
        tx.commit()
            .await
            .map_err(db_error("commit user limit deletion"))?;

        Ok(true)
    }

    async fn list_audit_entries(&self, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count audit entries"))?;

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, admin_id, action, target_id, details, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list audit entries"))?;

        Ok((entries, total))
    }
}

/// PostgreSQL-backed activity log
pub struct PgActivityLogRepository {
    pool: PgPool,
}

impl PgActivityLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogRepository for PgActivityLogRepository {
    async fn append(&self, record: NewActivityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs
                (user_id, endpoint, method, status_code, response_time_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.user_id)
        .bind(&record.endpoint)
        .bind(&record.method)
        .bind(record.status_code)
        .bind(record.response_time_ms)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_error("append activity record"))?;

        Ok(())
    }

    async fn count(&self, scope: &UsageScope, window_start: DateTime<Utc>) -> Result<i64> {
        match scope {
            UsageScope::User { user_id } => sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM activity_logs
                WHERE user_id = $1
                  AND created_at >= $2
                "#,
            )
            .bind(user_id)
            .bind(window_start)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count user activity")),
            UsageScope::Endpoint {
                pattern,
                method,
                user_id,
            } => {
                let method = match method {
                    MethodFilter::Any => None,
                    MethodFilter::Exact(m) => Some(m.as_str()),
                };

                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*)
                    FROM activity_logs
                    WHERE endpoint = $1
                      AND ($2::text IS NULL OR method = $2)
                      AND ($3::uuid IS NULL OR user_id = $3)
                      AND created_at >= $4
                    "#,
                )
                .bind(pattern)
                .bind(method)
                .bind(user_id)
                .bind(window_start)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count endpoint activity"))
            }
        }
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM activity_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_error("purge activity records"))?;

        Ok(result.rows_affected())
    }
}
