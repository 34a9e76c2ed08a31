//! Audit sink.
//!
//! Every mutating operation appends one entry. Writes are fire-and-forget:
//! the insert runs on a spawned task so an audit failure can never block or
//! fail the primary operation; failures are error-logged and dropped.

use crate::models::{AuditEntry, AuditLog};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an audit entry asynchronously (non-blocking).
    pub fn log_async(&self, entry: AuditEntry) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = insert_entry(&pool, &entry).await {
                tracing::error!(
                    error = %e,
                    action = entry.action,
                    entity_type = entry.entity_type,
                    "Failed to write audit log"
                );
            }
        });
    }

    /// Append an audit entry synchronously. Used by tests that need to
    /// observe the entry immediately.
    pub async fn log(&self, entry: AuditEntry) -> Result<(), AppError> {
        insert_entry(&self.pool, &entry)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Audit insert failed: {}", e)))
    }

    /// List audit entries for an entity, newest first.
    #[instrument(skip(self), fields(lab_id = %lab_id))]
    pub async fn list(
        &self,
        lab_id: Uuid,
        entity_type: Option<&str>,
        entity_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let entries = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT audit_id, lab_id, user_id, action, entity_type, entity_id,
                old_values, new_values, ip, user_agent, created_utc
            FROM audit_logs
            WHERE lab_id = $1
              AND ($2::varchar IS NULL OR entity_type = $2)
              AND ($3::uuid IS NULL OR entity_id = $3)
            ORDER BY created_utc DESC
            LIMIT $4
            "#,
        )
        .bind(lab_id)
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list audit logs: {}", e)))?;

        Ok(entries)
    }
}

async fn insert_entry(pool: &PgPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (audit_id, lab_id, user_id, action, entity_type, entity_id, old_values, new_values)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.lab_id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .execute(pool)
    .await?;

    Ok(())
}
