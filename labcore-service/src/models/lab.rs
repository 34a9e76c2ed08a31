use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant root. Every other entity is scoped to a `lab_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lab {
    pub lab_id: Uuid,
    pub name: String,
    pub slug: String,
    pub max_users: i32,
    pub gstin: Option<String>,
    pub branding: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}
