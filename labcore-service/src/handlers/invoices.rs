//! Invoice and payment handlers.

use crate::dtos::payments::{InvoiceDetailResponse, RecordPaymentRequest, RecordPaymentResponse};
use crate::middleware::auth::AuthContext;
use crate::models::RecordPayment;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// GET /invoices/:invoice_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, invoice_id = %invoice_id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, AppError> {
    let invoice = state.billing.get_invoice(&ctx, invoice_id).await?;
    let payments = state.billing.list_payments(&ctx, invoice_id).await?;
    Ok(Json(InvoiceDetailResponse { invoice, payments }))
}

/// POST /invoices/:invoice_id/payments
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, invoice_id = %invoice_id))]
pub async fn record_payment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), AppError> {
    payload.validate()?;

    let input = RecordPayment {
        invoice_id,
        amount: payload.amount,
        mode: payload.mode,
        reference: payload.reference,
        notes: payload.notes,
    };

    let (payment, invoice) = state.billing.record_payment(&ctx, &input).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordPaymentResponse { payment, invoice }),
    ))
}
