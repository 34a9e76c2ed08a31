//! Report generation, amendment, and sharing handlers.

use crate::dtos::reports::{
    AmendReportRequest, ShareReportRequest, ShareUrlQuery, ShareUrlResponse,
};
use crate::middleware::auth::AuthContext;
use crate::models::{Report, ReportShare};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// POST /orders/:order_id/report
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
pub async fn generate_report(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Report>, AppError> {
    let report = state.reports.get_or_create_for_order(&ctx, order_id).await?;
    Ok(Json(report))
}

/// GET /reports/:report_id/pdf
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
pub async fn get_report_pdf(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(report_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (bytes, filename) = state.reports.fetch_pdf(&ctx, report_id).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

/// POST /reports/:report_id/amend
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
pub async fn amend_report(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<AmendReportRequest>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    payload.validate()?;

    let report = state
        .reports
        .amend_report(&ctx, report_id, &payload.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /reports/:report_id/share-url
#[tracing::instrument(skip(state, ctx, query), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
pub async fn share_url(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(report_id): Path<Uuid>,
    Query(query): Query<ShareUrlQuery>,
) -> Result<Json<ShareUrlResponse>, AppError> {
    let url = state
        .reports
        .share_url(&ctx, report_id, query.ttl_seconds)
        .await?;
    Ok(Json(ShareUrlResponse { url }))
}

/// POST /reports/:report_id/share
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, report_id = %report_id))]
pub async fn mark_shared(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<ShareReportRequest>,
) -> Result<(StatusCode, Json<ReportShare>), AppError> {
    payload.validate()?;

    let share = state
        .reports
        .mark_shared(&ctx, report_id, &payload.channel, payload.shared_with)
        .await?;
    Ok((StatusCode::CREATED, Json(share)))
}
