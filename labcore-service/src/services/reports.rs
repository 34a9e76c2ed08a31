//! Report generation, versioning, and amendment.
//!
//! A report version is immutable once its PDF is stored. Rendering is a
//! best-effort cache: when the upload fails the version is marked
//! `render_failed` and the PDF is rebuilt on the fly on every fetch until
//! storage recovers. Amendment reverts the order's authorised results to
//! reviewed and opens a new version; prior rows are never touched.

use crate::middleware::auth::AuthContext;
use crate::models::{
    actions, Action, AuditEntry, LabResult, RenderStatus, Report, ReportShare, ResultStatus,
};
use crate::services::audit::AuditService;
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, REPORTS_TOTAL};
use crate::services::pdf::{build_report_pdf, ReportPdfData, ReportTestSection, ReportValueRow};
use crate::services::storage::Storage;
use serde_json::json;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ReportService {
    db: Database,
    audit: AuditService,
    storage: Arc<dyn Storage>,
}

impl ReportService {
    pub fn new(db: Database, audit: AuditService, storage: Arc<dyn Storage>) -> Self {
        Self { db, audit, storage }
    }

    /// Get the order's current report, creating version 1 when none exists,
    /// and render/store its PDF when it is not already stored.
    ///
    /// Fails unless every non-cancelled order item has an authorised result.
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
    pub async fn get_or_create_for_order(
        &self,
        ctx: &AuthContext,
        order_id: Uuid,
    ) -> Result<Report, AppError> {
        ctx.require(Action::GenerateReport)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_or_create_report"])
            .start_timer();

        let order = self
            .db
            .get_order(ctx.lab_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        self.ensure_order_authorised(ctx.lab_id, order_id).await?;

        let (report, created) = match self
            .db
            .get_latest_report_for_order(ctx.lab_id, order_id)
            .await?
        {
            Some(report) => (report, false),
            None => {
                let report_code = format!("RPT-{}-v1", order.code);
                let report = self
                    .insert_report_version(ctx, order_id, &report_code, 1, false, None)
                    .await?;
                (report, true)
            }
        };

        let report = if RenderStatus::from_string(&report.render_status) != RenderStatus::Rendered
        {
            self.render_and_store(ctx, &report).await?
        } else {
            report
        };

        timer.observe_duration();

        if created {
            self.audit.log_async(
                AuditEntry::new(
                    ctx.lab_id,
                    ctx.user_id,
                    actions::REPORT_GENERATE,
                    "report",
                    report.report_id,
                )
                .with_new(json!({
                    "report_code": report.report_code,
                    "version": report.version,
                    "render_status": report.render_status,
                })),
            );
        }

        Ok(report)
    }

    /// Fetch the PDF bytes for a report version.
    ///
    /// Stored bytes are served when present; otherwise the PDF is rebuilt
    /// from the order's current state (best-effort cache semantics).
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
    pub async fn fetch_pdf(
        &self,
        ctx: &AuthContext,
        report_id: Uuid,
    ) -> Result<(Vec<u8>, String), AppError> {
        let report = self
            .db
            .get_report(ctx.lab_id, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))?;

        let filename = format!("{}.pdf", report.report_code);

        if RenderStatus::from_string(&report.render_status) == RenderStatus::Rendered {
            if let Some(path) = &report.pdf_path {
                match self.storage.download(path).await {
                    Ok(bytes) => return Ok((bytes, filename)),
                    Err(e) => {
                        warn!(error = %e, path = %path, "Stored PDF unavailable, rendering on the fly");
                    }
                }
            }
        }

        let data = self.assemble_pdf_data(ctx.lab_id, &report).await?;
        let bytes = build_report_pdf(&data)?;
        Ok((bytes, filename))
    }

    /// Amend a report: revert the order's authorised results to reviewed and
    /// open the next version.
    #[instrument(skip(self, ctx, reason), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
    pub async fn amend_report(
        &self,
        ctx: &AuthContext,
        report_id: Uuid,
        reason: &str,
    ) -> Result<Report, AppError> {
        ctx.require(Action::AmendReport)?;

        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An amendment reason is required"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["amend_report"])
            .start_timer();

        let report = self
            .db
            .get_report(ctx.lab_id, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))?;

        let latest = self
            .db
            .get_latest_report_for_order(ctx.lab_id, report.order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))?;

        let order = self
            .db
            .get_order(ctx.lab_id, report.order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        let next_version = latest.version + 1;
        let report_code = format!("RPT-{}-v{}", order.code, next_version);

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Revert exactly the currently-authorised results of this order.
        let reverted = sqlx::query(
            r#"
            UPDATE results
            SET status = 'reviewed',
                authorised_by = NULL,
                authorised_utc = NULL
            WHERE lab_id = $1 AND order_id = $2 AND status = 'authorised'
            "#,
        )
        .bind(ctx.lab_id)
        .bind(report.order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to revert results: {}", e)))?
        .rows_affected();

        let new_report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (
                report_id, lab_id, order_id, report_code, version, render_status,
                is_amended, amendment_reason, generated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8)
            RETURNING report_id, lab_id, order_id, report_code, version, render_status, pdf_path,
                is_amended, amendment_reason, generated_by, created_utc, rendered_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ctx.lab_id)
        .bind(report.order_id)
        .bind(&report_code)
        .bind(next_version)
        .bind(RenderStatus::PendingRender.as_str())
        .bind(reason)
        .bind(ctx.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert report: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            report_code = %new_report.report_code,
            version = new_report.version,
            results_reverted = reverted,
            "Report amended"
        );

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::REPORT_AMEND,
                "report",
                new_report.report_id,
            )
            .with_old(json!({
                "report_code": report.report_code,
                "version": report.version,
            }))
            .with_new(json!({
                "report_code": new_report.report_code,
                "version": new_report.version,
                "reason": reason,
                "results_reverted": reverted,
            })),
        );

        Ok(new_report)
    }

    /// Expiring share link for a stored report PDF.
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
    pub async fn share_url(
        &self,
        ctx: &AuthContext,
        report_id: Uuid,
        ttl_seconds: u64,
    ) -> Result<String, AppError> {
        ctx.require(Action::GenerateReport)?;

        let report = self
            .db
            .get_report(ctx.lab_id, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))?;

        let path = match (
            RenderStatus::from_string(&report.render_status),
            &report.pdf_path,
        ) {
            (RenderStatus::Rendered, Some(path)) => path.clone(),
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Report PDF is not stored yet; generate the report first"
                )))
            }
        };

        self.storage
            .signed_url(&path, Duration::from_secs(ttl_seconds))
            .await
    }

    /// Record that a report was shared through some channel.
    #[instrument(skip(self, ctx, shared_with), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
    pub async fn mark_shared(
        &self,
        ctx: &AuthContext,
        report_id: Uuid,
        channel: &str,
        shared_with: Option<String>,
    ) -> Result<ReportShare, AppError> {
        ctx.require(Action::GenerateReport)?;

        // 404 before inserting the delivery-log row.
        self.db
            .get_report(ctx.lab_id, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))?;

        let share = sqlx::query_as::<_, ReportShare>(
            r#"
            INSERT INTO report_shares (share_id, lab_id, report_id, channel, shared_with, shared_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING share_id, lab_id, report_id, channel, shared_with, shared_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ctx.lab_id)
        .bind(report_id)
        .bind(channel)
        .bind(&shared_with)
        .bind(ctx.user_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record share: {}", e)))?;

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::REPORT_SHARE,
                "report",
                report_id,
            )
            .with_new(json!({ "channel": channel })),
        );

        Ok(share)
    }

    /// Every non-cancelled order item must have an authorised result.
    async fn ensure_order_authorised(&self, lab_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let items = self.db.get_order_items(lab_id, order_id).await?;
        let results = self.db.get_results_for_order(lab_id, order_id).await?;
        let by_item: HashMap<Uuid, &LabResult> =
            results.iter().map(|r| (r.order_item_id, r)).collect();

        let live_items: Vec<_> = items.iter().filter(|i| !i.is_cancelled()).collect();
        if live_items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order has no active items to report on"
            )));
        }

        for item in live_items {
            let authorised = by_item
                .get(&item.order_item_id)
                .map(|r| ResultStatus::parse(&r.status) == Some(ResultStatus::Authorised))
                .unwrap_or(false);
            if !authorised {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "All results must be authorised before generating a report"
                )));
            }
        }

        Ok(())
    }

    async fn insert_report_version(
        &self,
        ctx: &AuthContext,
        order_id: Uuid,
        report_code: &str,
        version: i32,
        is_amended: bool,
        amendment_reason: Option<&str>,
    ) -> Result<Report, AppError> {
        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (
                report_id, lab_id, order_id, report_code, version, render_status,
                is_amended, amendment_reason, generated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING report_id, lab_id, order_id, report_code, version, render_status, pdf_path,
                is_amended, amendment_reason, generated_by, created_utc, rendered_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ctx.lab_id)
        .bind(order_id)
        .bind(report_code)
        .bind(version)
        .bind(RenderStatus::PendingRender.as_str())
        .bind(is_amended)
        .bind(amendment_reason)
        .bind(ctx.user_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Report version {} already exists for this order",
                    version
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert report: {}", e)),
        })?;

        Ok(report)
    }

    /// Render the PDF and try to store it. A storage failure marks the
    /// version `render_failed` and is otherwise swallowed; the caller still
    /// gets a usable report row.
    async fn render_and_store(
        &self,
        ctx: &AuthContext,
        report: &Report,
    ) -> Result<Report, AppError> {
        let data = self.assemble_pdf_data(ctx.lab_id, report).await?;
        let bytes = build_report_pdf(&data)?;
        let path = format!(
            "reports/{}/{}/{}.pdf",
            ctx.lab_id, report.order_id, report.report_code
        );

        let (render_status, pdf_path) = match self.storage.upload(&path, bytes).await {
            Ok(()) => (RenderStatus::Rendered, Some(path)),
            Err(e) => {
                warn!(
                    error = %e,
                    report_code = %report.report_code,
                    "PDF upload failed; report will render on the fly until storage recovers"
                );
                (RenderStatus::RenderFailed, None)
            }
        };

        REPORTS_TOTAL
            .with_label_values(&[render_status.as_str()])
            .inc();

        let updated = sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports
            SET render_status = $3,
                pdf_path = $4,
                rendered_utc = CASE WHEN $3 = 'rendered' THEN NOW() ELSE rendered_utc END
            WHERE lab_id = $1 AND report_id = $2
            RETURNING report_id, lab_id, order_id, report_code, version, render_status, pdf_path,
                is_amended, amendment_reason, generated_by, created_utc, rendered_utc
            "#,
        )
        .bind(ctx.lab_id)
        .bind(report.report_id)
        .bind(render_status.as_str())
        .bind(&pdf_path)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update report: {}", e)))?;

        if render_status == RenderStatus::Rendered {
            info!(report_code = %updated.report_code, path = ?updated.pdf_path, "Report PDF stored");
        }

        Ok(updated)
    }

    /// Assemble the denormalized snapshot the PDF builder needs.
    async fn assemble_pdf_data(
        &self,
        lab_id: Uuid,
        report: &Report,
    ) -> Result<ReportPdfData, AppError> {
        let lab = self
            .db
            .get_lab(lab_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Lab not found")))?;

        let order = self
            .db
            .get_order(lab_id, report.order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        let patient = self
            .db
            .get_patient(lab_id, order.patient_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Patient not found")))?;

        let items: Vec<_> = self
            .db
            .get_order_items(lab_id, report.order_id)
            .await?
            .into_iter()
            .filter(|i| !i.is_cancelled())
            .collect();

        let test_ids: Vec<Uuid> = items.iter().map(|i| i.test_id).collect();
        let tests: HashMap<Uuid, _> = self
            .db
            .get_test_definitions(lab_id, &test_ids, false)
            .await?
            .into_iter()
            .map(|t| (t.test_id, t))
            .collect();
        let parameters = self.db.get_test_parameters(&test_ids).await?;

        let results = self.db.get_results_for_order(lab_id, report.order_id).await?;
        let results_by_item: HashMap<Uuid, _> =
            results.into_iter().map(|r| (r.order_item_id, r)).collect();

        let mut sections = Vec::with_capacity(items.len());
        for item in &items {
            let test = tests.get(&item.test_id).ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Test definition missing for order item {}",
                    item.order_item_id
                ))
            })?;

            let (rows, notes, authorised_utc) =
                match results_by_item.get(&item.order_item_id) {
                    Some(result) => {
                        let values = self.db.get_result_values(result.result_id).await?;
                        let values_by_parameter: HashMap<Uuid, _> = values
                            .into_iter()
                            .map(|v| (v.parameter_id, v))
                            .collect();

                        let rows = parameters
                            .iter()
                            .filter(|p| p.test_id == item.test_id)
                            .filter_map(|p| {
                                values_by_parameter.get(&p.parameter_id).map(|v| {
                                    ReportValueRow {
                                        parameter: p.name.clone(),
                                        value: v.value.clone(),
                                        unit: v.unit.clone().or_else(|| p.unit.clone()),
                                        reference_range: p.reference_range.clone(),
                                    }
                                })
                            })
                            .collect();

                        (rows, result.notes.clone(), result.authorised_utc)
                    }
                    None => (Vec::new(), None, None),
                };

            sections.push(ReportTestSection {
                test_name: test.name.clone(),
                specimen_type: test.specimen_type.clone(),
                authorised_utc,
                notes,
                rows,
            });
        }

        Ok(ReportPdfData {
            lab_name: lab.name,
            lab_gstin: lab.gstin,
            report_code: report.report_code.clone(),
            version: report.version,
            is_amended: report.is_amended,
            amendment_reason: report.amendment_reason.clone(),
            patient_name: patient.full_name,
            patient_code: patient.code,
            order_code: order.code,
            priority: order.priority,
            tests: sections,
        })
    }
}
