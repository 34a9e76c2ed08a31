//! Sample tracking handlers.

use crate::dtos::results::{SampleResponse, UpdateSampleStatusRequest};
use crate::middleware::auth::AuthContext;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// GET /samples/:sample_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, sample_id = %sample_id))]
pub async fn get_sample(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(sample_id): Path<Uuid>,
) -> Result<Json<SampleResponse>, AppError> {
    let sample = state.samples.get_sample(&ctx, sample_id).await?;
    Ok(Json(SampleResponse { sample }))
}

/// POST /samples/:sample_id/status
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, sample_id = %sample_id))]
pub async fn update_sample_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(sample_id): Path<Uuid>,
    Json(payload): Json<UpdateSampleStatusRequest>,
) -> Result<Json<SampleResponse>, AppError> {
    let sample = state
        .samples
        .update_status(&ctx, sample_id, payload.status, payload.rejection_reason)
        .await?;
    Ok(Json(SampleResponse { sample }))
}
