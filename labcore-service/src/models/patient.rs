use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Patient record. Soft-deleted via `deleted_at`; deleted patients are
/// invisible to every lookup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub patient_id: Uuid,
    pub lab_id: Uuid,
    pub code: String,
    pub full_name: String,
    pub sex: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering a patient.
#[derive(Debug, Clone)]
pub struct CreatePatient {
    pub full_name: String,
    pub sex: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line: Option<String>,
}

/// Input for updating patient demographics.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatient {
    pub full_name: Option<String>,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line: Option<String>,
}

/// Filter parameters for listing patients.
#[derive(Debug, Clone, Default)]
pub struct ListPatientsFilter {
    pub search: Option<String>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
