//! Sample tracking.
//!
//! Samples move `ordered → collected → received → in_process → completed`
//! and then to `stored` or `disposed`; rejection is allowed from any live
//! state and requires a reason. Collection and receipt record actor and
//! timestamp.

use crate::middleware::auth::AuthContext;
use crate::models::{actions, Action, AuditEntry, Sample, SampleStatus};
use crate::services::audit::AuditService;
use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct SampleService {
    db: Database,
    audit: AuditService,
}

impl SampleService {
    pub fn new(db: Database, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Get a sample, checking tenant scope.
    pub async fn get_sample(&self, ctx: &AuthContext, sample_id: Uuid) -> Result<Sample, AppError> {
        self.db
            .get_sample(ctx.lab_id, sample_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sample not found")))
    }

    /// Advance a sample through its lifecycle.
    #[instrument(skip(self, ctx, rejection_reason), fields(lab_id = %ctx.lab_id, sample_id = %sample_id, requested = requested.as_str()))]
    pub async fn update_status(
        &self,
        ctx: &AuthContext,
        sample_id: Uuid,
        requested: SampleStatus,
        rejection_reason: Option<String>,
    ) -> Result<Sample, AppError> {
        ctx.require(Action::UpdateSample)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_sample_status"])
            .start_timer();

        let sample = self.get_sample(ctx, sample_id).await?;
        let current = SampleStatus::parse(&sample.status).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Sample {} has unknown status '{}'",
                sample.sample_id,
                sample.status
            ))
        })?;

        if !current.can_transition_to(requested) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid sample status transition: {} -> {}",
                current.as_str(),
                requested.as_str()
            )));
        }

        if requested == SampleStatus::Rejected && rejection_reason.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Rejecting a sample requires a reason"
            )));
        }

        let updated = sqlx::query_as::<_, Sample>(
            r#"
            UPDATE samples
            SET status = $3,
                updated_utc = NOW(),
                collected_by = CASE WHEN $3 = 'collected' THEN $4 ELSE collected_by END,
                collected_utc = CASE WHEN $3 = 'collected' THEN NOW() ELSE collected_utc END,
                received_utc = CASE WHEN $3 = 'received' THEN NOW() ELSE received_utc END,
                rejection_reason = CASE WHEN $3 = 'rejected' THEN $5 ELSE rejection_reason END
            WHERE lab_id = $1 AND sample_id = $2
            RETURNING sample_id, lab_id, order_item_id, code, barcode, status, rejection_reason,
                collected_by, collected_utc, received_utc, updated_utc
            "#,
        )
        .bind(ctx.lab_id)
        .bind(sample_id)
        .bind(requested.as_str())
        .bind(ctx.user_id)
        .bind(&rejection_reason)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update sample: {}", e)))?;

        timer.observe_duration();

        info!(
            sample_code = %updated.code,
            from = current.as_str(),
            to = %updated.status,
            "Sample status updated"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::SAMPLE_STATUS_UPDATE,
                "sample",
                sample_id,
            )
            .with_old(json!({ "status": current.as_str() }))
            .with_new(json!({ "status": updated.status })),
        );

        Ok(updated)
    }
}
