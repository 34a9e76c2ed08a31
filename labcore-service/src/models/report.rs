use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Rendering state of a report version. Replaces the nullable-URL flag the
/// original system used: `pending_render` until a PDF is built, `rendered`
/// once it is stored, `render_failed` when storage rejected the upload and
/// the PDF is regenerated on the fly on each fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    PendingRender,
    Rendered,
    RenderFailed,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::PendingRender => "pending_render",
            RenderStatus::Rendered => "rendered",
            RenderStatus::RenderFailed => "render_failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "rendered" => RenderStatus::Rendered,
            "render_failed" => RenderStatus::RenderFailed,
            _ => RenderStatus::PendingRender,
        }
    }
}

/// One generated report version for an order. Prior versions are never
/// mutated; amendment inserts a new row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub report_id: Uuid,
    pub lab_id: Uuid,
    pub order_id: Uuid,
    pub report_code: String,
    pub version: i32,
    pub render_status: String,
    pub pdf_path: Option<String>,
    pub is_amended: bool,
    pub amendment_reason: Option<String>,
    pub generated_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub rendered_utc: Option<DateTime<Utc>>,
}

/// Delivery-log row recorded when a report is shared.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportShare {
    pub share_id: Uuid,
    pub lab_id: Uuid,
    pub report_id: Uuid,
    pub channel: String,
    pub shared_with: Option<String>,
    pub shared_by: Uuid,
    pub created_utc: DateTime<Utc>,
}
