//! Result lifecycle: pending → entered → reviewed → authorised.
//!
//! Value entry always lands the result in `entered`, however often it is
//! repeated. Review and authorisation are explicit transitions guarded by
//! the capability matrix and the transition table on `ResultStatus`;
//! amendment (reports service) is the only path that moves an authorised
//! result back to reviewed.

use crate::middleware::auth::AuthContext;
use crate::models::{
    actions, Action, AuditEntry, LabResult, OrderItem, ParameterValue, ResultStatus, ResultValue,
};
use crate::services::audit::AuditService;
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, RESULT_TRANSITIONS_TOTAL};
use serde_json::json;
use service_core::error::AppError;
use std::collections::BTreeSet;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct ResultService {
    db: Database,
    audit: AuditService,
}

impl ResultService {
    pub fn new(db: Database, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Enter or re-enter values for a result.
    ///
    /// One `ResultValue` row is upserted per supplied parameter; parameter
    /// ids that do not belong to the item's test definition are silently
    /// ignored. The result always ends up `entered`.
    #[instrument(skip(self, ctx, values), fields(lab_id = %ctx.lab_id, result_id = %result_id))]
    pub async fn submit_values(
        &self,
        ctx: &AuthContext,
        result_id: Uuid,
        values: &[ParameterValue],
    ) -> Result<LabResult, AppError> {
        ctx.require(Action::EnterResults)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["submit_values"])
            .start_timer();

        let (_result, current, item) = self.load_live_result(ctx.lab_id, result_id).await?;

        if !current.accepts_values() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Values can only be entered while a result is pending or entered"
            )));
        }

        let known_parameters: BTreeSet<Uuid> = self
            .db
            .get_test_parameters(&[item.test_id])
            .await?
            .into_iter()
            .map(|p| p.parameter_id)
            .collect();

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut stored = 0usize;
        for value in values {
            if !known_parameters.contains(&value.parameter_id) {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO result_values (result_id, parameter_id, value, numeric_value, unit)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (result_id, parameter_id)
                DO UPDATE SET value = EXCLUDED.value,
                              numeric_value = EXCLUDED.numeric_value,
                              unit = EXCLUDED.unit,
                              updated_utc = NOW()
                "#,
            )
            .bind(result_id)
            .bind(value.parameter_id)
            .bind(&value.value)
            .bind(value.numeric_value)
            .bind(&value.unit)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to store result value: {}", e))
            })?;
            stored += 1;
        }

        let updated = sqlx::query_as::<_, LabResult>(
            r#"
            UPDATE results
            SET status = $3,
                entered_by = $4,
                entered_utc = NOW()
            WHERE lab_id = $1 AND result_id = $2
            RETURNING result_id, lab_id, order_id, order_item_id, status, notes,
                entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
            "#,
        )
        .bind(ctx.lab_id)
        .bind(result_id)
        .bind(ResultStatus::Entered.as_str())
        .bind(ctx.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update result: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        RESULT_TRANSITIONS_TOTAL
            .with_label_values(&[ResultStatus::Entered.as_str()])
            .inc();

        info!(
            result_id = %result_id,
            values_stored = stored,
            values_ignored = values.len() - stored,
            "Result values entered"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::RESULT_VALUES_SUBMIT,
                "result",
                result_id,
            )
            .with_old(json!({ "status": current.as_str() }))
            .with_new(json!({ "status": updated.status, "values": stored })),
        );

        Ok(updated)
    }

    /// Move a result through the review workflow.
    ///
    /// `entered` is not a valid request here; it is only reachable through
    /// `submit_values`.
    #[instrument(skip(self, ctx, notes), fields(lab_id = %ctx.lab_id, result_id = %result_id, requested = requested.as_str()))]
    pub async fn update_status(
        &self,
        ctx: &AuthContext,
        result_id: Uuid,
        requested: ResultStatus,
        notes: Option<String>,
    ) -> Result<LabResult, AppError> {
        match requested {
            ResultStatus::Reviewed => ctx.require(Action::ReviewResults)?,
            ResultStatus::Authorised => ctx.require(Action::AuthoriseResults)?,
            ResultStatus::Pending => ctx.require(Action::RevertResults)?,
            ResultStatus::Entered => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invalid status transition"
                )))
            }
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_result_status"])
            .start_timer();

        let (_result, current, _item) = self.load_live_result(ctx.lab_id, result_id).await?;

        if !current.can_transition_to(requested) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid status transition"
            )));
        }

        let updated = match requested {
            ResultStatus::Reviewed => {
                sqlx::query_as::<_, LabResult>(
                    r#"
                    UPDATE results
                    SET status = 'reviewed',
                        reviewed_by = $3,
                        reviewed_utc = NOW()
                    WHERE lab_id = $1 AND result_id = $2
                    RETURNING result_id, lab_id, order_id, order_item_id, status, notes,
                        entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
                    "#,
                )
                .bind(ctx.lab_id)
                .bind(result_id)
                .bind(ctx.user_id)
                .fetch_one(self.db.pool())
                .await
            }
            ResultStatus::Authorised => {
                sqlx::query_as::<_, LabResult>(
                    r#"
                    UPDATE results
                    SET status = 'authorised',
                        authorised_by = $3,
                        authorised_utc = NOW(),
                        notes = COALESCE($4, notes)
                    WHERE lab_id = $1 AND result_id = $2
                    RETURNING result_id, lab_id, order_id, order_item_id, status, notes,
                        entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
                    "#,
                )
                .bind(ctx.lab_id)
                .bind(result_id)
                .bind(ctx.user_id)
                .bind(&notes)
                .fetch_one(self.db.pool())
                .await
            }
            ResultStatus::Pending => {
                sqlx::query_as::<_, LabResult>(
                    r#"
                    UPDATE results
                    SET status = 'pending',
                        entered_by = NULL,
                        entered_utc = NULL
                    WHERE lab_id = $1 AND result_id = $2
                    RETURNING result_id, lab_id, order_id, order_item_id, status, notes,
                        entered_by, entered_utc, reviewed_by, reviewed_utc, authorised_by, authorised_utc
                    "#,
                )
                .bind(ctx.lab_id)
                .bind(result_id)
                .fetch_one(self.db.pool())
                .await
            }
            ResultStatus::Entered => unreachable!("rejected above"),
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update result: {}", e)))?;

        timer.observe_duration();
        RESULT_TRANSITIONS_TOTAL
            .with_label_values(&[requested.as_str()])
            .inc();

        info!(
            result_id = %result_id,
            from = current.as_str(),
            to = %updated.status,
            "Result status updated"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::RESULT_STATUS_UPDATE,
                "result",
                result_id,
            )
            .with_old(json!({ "status": current.as_str() }))
            .with_new(json!({ "status": updated.status })),
        );

        Ok(updated)
    }

    /// Get a result with its stored values.
    pub async fn get_result(
        &self,
        ctx: &AuthContext,
        result_id: Uuid,
    ) -> Result<(LabResult, Vec<ResultValue>), AppError> {
        let result = self
            .db
            .get_result(ctx.lab_id, result_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Result not found")))?;
        let values = self.db.get_result_values(result_id).await?;
        Ok((result, values))
    }

    /// Load a result, rejecting unknown ids, corrupt statuses, and results
    /// whose order item has been cancelled.
    async fn load_live_result(
        &self,
        lab_id: Uuid,
        result_id: Uuid,
    ) -> Result<(LabResult, ResultStatus, OrderItem), AppError> {
        let result = self
            .db
            .get_result(lab_id, result_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Result not found")))?;

        let current = ResultStatus::parse(&result.status).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Result {} has unknown status '{}'",
                result.result_id,
                result.status
            ))
        })?;

        let item = self
            .db
            .get_order_item(lab_id, result.order_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order item not found")))?;

        if item.is_cancelled() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order item has been cancelled"
            )));
        }

        Ok((result, current, item))
    }
}
