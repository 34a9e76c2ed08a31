//! Result entry and review handlers.

use crate::dtos::results::{
    ResultDetailResponse, SubmitValuesRequest, UpdateResultStatusRequest,
};
use crate::middleware::auth::AuthContext;
use crate::models::LabResult;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// GET /results/:result_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, result_id = %result_id))]
pub async fn get_result(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(result_id): Path<Uuid>,
) -> Result<Json<ResultDetailResponse>, AppError> {
    let (result, values) = state.results.get_result(&ctx, result_id).await?;
    Ok(Json(ResultDetailResponse { result, values }))
}

/// POST /results/:result_id/values
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, result_id = %result_id))]
pub async fn submit_values(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(result_id): Path<Uuid>,
    Json(payload): Json<SubmitValuesRequest>,
) -> Result<Json<LabResult>, AppError> {
    payload.validate()?;

    let result = state
        .results
        .submit_values(&ctx, result_id, &payload.values)
        .await?;
    Ok(Json(result))
}

/// POST /results/:result_id/status
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, result_id = %result_id))]
pub async fn update_result_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(result_id): Path<Uuid>,
    Json(payload): Json<UpdateResultStatusRequest>,
) -> Result<Json<LabResult>, AppError> {
    let result = state
        .results
        .update_status(&ctx, result_id, payload.status, payload.notes)
        .await?;
    Ok(Json(result))
}
