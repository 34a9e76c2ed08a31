//! Patient registration and demographics.

use crate::middleware::auth::AuthContext;
use crate::models::{
    actions, Action, AuditEntry, CreatePatient, ListPatientsFilter, Patient, UpdatePatient,
};
use crate::services::audit::AuditService;
use crate::services::codes::{allocate_code, CodePrefix};
use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const CODE_RETRY_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct PatientService {
    db: Database,
    audit: AuditService,
}

impl PatientService {
    pub fn new(db: Database, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Register a patient, allocating the human-readable code.
    #[instrument(skip(self, ctx, input), fields(lab_id = %ctx.lab_id))]
    pub async fn register(
        &self,
        ctx: &AuthContext,
        input: &CreatePatient,
    ) -> Result<Patient, AppError> {
        ctx.require(Action::RegisterPatient)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["register_patient"])
            .start_timer();

        let today = Utc::now().date_naive();
        let mut attempt = 0;
        let patient = loop {
            attempt += 1;

            let mut tx = self.db.pool().begin().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
            })?;

            let code = allocate_code(&mut *tx, ctx.lab_id, CodePrefix::Patient, today).await?;

            let inserted = sqlx::query_as::<_, Patient>(
                r#"
                INSERT INTO patients (patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email, address_line)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email,
                    address_line, deleted_at, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(ctx.lab_id)
            .bind(&code)
            .bind(&input.full_name)
            .bind(&input.sex)
            .bind(input.date_of_birth)
            .bind(&input.phone)
            .bind(&input.email)
            .bind(&input.address_line)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(patient) => {
                    tx.commit().await.map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e))
                    })?;
                    break patient;
                }
                Err(sqlx::Error::Database(ref db_err))
                    if db_err.is_unique_violation() && attempt < CODE_RETRY_ATTEMPTS =>
                {
                    warn!(attempt = attempt, "Patient code collision, retrying allocation");
                    continue;
                }
                Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Could not allocate a unique patient code"
                    )));
                }
                Err(e) => {
                    return Err(AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to register patient: {}",
                        e
                    )));
                }
            }
        };

        timer.observe_duration();

        info!(patient_code = %patient.code, "Patient registered");

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::PATIENT_REGISTER,
                "patient",
                patient.patient_id,
            )
            .with_new(json!({ "code": patient.code, "full_name": patient.full_name })),
        );

        Ok(patient)
    }

    /// Get an active patient, checking tenant scope.
    pub async fn get_patient(
        &self,
        ctx: &AuthContext,
        patient_id: Uuid,
    ) -> Result<Patient, AppError> {
        self.db
            .get_patient(ctx.lab_id, patient_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Patient not found")))
    }

    /// List active patients.
    pub async fn list_patients(
        &self,
        ctx: &AuthContext,
        filter: &ListPatientsFilter,
    ) -> Result<Vec<Patient>, AppError> {
        self.db.list_patients(ctx.lab_id, filter).await
    }

    /// Update patient demographics.
    #[instrument(skip(self, ctx, input), fields(lab_id = %ctx.lab_id, patient_id = %patient_id))]
    pub async fn update(
        &self,
        ctx: &AuthContext,
        patient_id: Uuid,
        input: &UpdatePatient,
    ) -> Result<Patient, AppError> {
        ctx.require(Action::RegisterPatient)?;

        let existing = self.get_patient(ctx, patient_id).await?;

        let patient = sqlx::query_as::<_, Patient>(
            r#"
            UPDATE patients
            SET full_name = COALESCE($3, full_name),
                sex = COALESCE($4, sex),
                date_of_birth = COALESCE($5, date_of_birth),
                phone = COALESCE($6, phone),
                email = COALESCE($7, email),
                address_line = COALESCE($8, address_line)
            WHERE lab_id = $1 AND patient_id = $2 AND deleted_at IS NULL
            RETURNING patient_id, lab_id, code, full_name, sex, date_of_birth, phone, email,
                address_line, deleted_at, created_utc
            "#,
        )
        .bind(ctx.lab_id)
        .bind(patient_id)
        .bind(&input.full_name)
        .bind(&input.sex)
        .bind(input.date_of_birth)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address_line)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update patient: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Patient not found")))?;

        self.audit.log_async(
            AuditEntry::new(
                ctx.lab_id,
                ctx.user_id,
                actions::PATIENT_UPDATE,
                "patient",
                patient_id,
            )
            .with_old(json!({ "full_name": existing.full_name }))
            .with_new(json!({ "full_name": patient.full_name })),
        );

        Ok(patient)
    }

    /// Soft-delete a patient. Deleted patients fail every lookup, including
    /// order creation.
    #[instrument(skip(self, ctx), fields(lab_id = %ctx.lab_id, patient_id = %patient_id))]
    pub async fn soft_delete(&self, ctx: &AuthContext, patient_id: Uuid) -> Result<(), AppError> {
        ctx.require(Action::RegisterPatient)?;

        let deleted = sqlx::query(
            r#"
            UPDATE patients
            SET deleted_at = NOW()
            WHERE lab_id = $1 AND patient_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(ctx.lab_id)
        .bind(patient_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete patient: {}", e)))?
        .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Patient not found")));
        }

        info!(patient_id = %patient_id, "Patient soft-deleted");

        self.audit.log_async(AuditEntry::new(
            ctx.lab_id,
            ctx.user_id,
            actions::PATIENT_DELETE,
            "patient",
            patient_id,
        ));

        Ok(())
    }
}
