//! Audit log query handler.

use crate::middleware::auth::AuthContext;
use crate::models::{Action, AuditLog};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListAuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /audit
#[tracing::instrument(skip(state, ctx, query), fields(lab_id = %ctx.lab_id))]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListAuditQuery>,
) -> Result<Json<Vec<AuditLog>>, AppError> {
    ctx.require(Action::ViewAudit)?;

    let entries = state
        .audit
        .list(
            ctx.lab_id,
            query.entity_type.as_deref(),
            query.entity_id,
            query.limit,
        )
        .await?;
    Ok(Json(entries))
}
