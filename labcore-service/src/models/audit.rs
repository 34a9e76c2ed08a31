use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit action names, one per mutating operation.
pub mod actions {
    pub const PATIENT_REGISTER: &str = "patient_register";
    pub const PATIENT_UPDATE: &str = "patient_update";
    pub const PATIENT_DELETE: &str = "patient_delete";
    pub const ORDER_CREATE: &str = "order_create";
    pub const ORDER_ITEMS_ADD: &str = "order_items_add";
    pub const ORDER_ITEM_CANCEL: &str = "order_item_cancel";
    pub const SAMPLE_STATUS_UPDATE: &str = "sample_status_update";
    pub const RESULT_VALUES_SUBMIT: &str = "result_values_submit";
    pub const RESULT_STATUS_UPDATE: &str = "result_status_update";
    pub const PAYMENT_RECORD: &str = "payment_record";
    pub const REPORT_GENERATE: &str = "report_generate";
    pub const REPORT_AMEND: &str = "report_amend";
    pub const REPORT_SHARE: &str = "report_share";
}

/// Stored audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub audit_id: Uuid,
    pub lab_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for one audit entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub lab_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        lab_id: Uuid,
        user_id: Uuid,
        action: &'static str,
        entity_type: &'static str,
        entity_id: Uuid,
    ) -> Self {
        Self {
            lab_id,
            user_id: Some(user_id),
            action,
            entity_type,
            entity_id: Some(entity_id),
            old_values: None,
            new_values: None,
        }
    }

    pub fn with_old(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }
}
