//! Order entry handlers.

use crate::dtos::orders::{
    AddItemsRequest, AddItemsResponse, CancelRequest, CreateOrderRequest, CreateOrderResponse,
    OrderDetailResponse,
};
use crate::middleware::auth::AuthContext;
use crate::models::{CreateOrder, OrderItem};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// POST /orders
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id))]
pub async fn create_order(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    payload.validate()?;

    let input = CreateOrder {
        patient_id: payload.patient_id,
        test_ids: payload.test_ids,
        priority: payload.priority,
        discount_amount: payload.discount_amount,
        discount_percent: payload.discount_percent,
        rate_card_id: payload.rate_card_id,
    };

    let created = state.orders.create_order(&ctx, &input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order: created.order,
            items: created.items,
            invoice: created.invoice,
        }),
    ))
}

/// GET /orders/:order_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
pub async fn get_order(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = state
        .db
        .get_order(ctx.lab_id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;
    let items = state.db.get_order_items(ctx.lab_id, order_id).await?;
    let invoices = state.db.get_invoices_for_order(ctx.lab_id, order_id).await?;

    Ok(Json(OrderDetailResponse {
        order,
        items,
        invoices,
    }))
}

/// POST /orders/:order_id/cancel
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Vec<OrderItem>>, AppError> {
    payload.validate()?;

    let cancelled = state
        .orders
        .cancel_order(&ctx, order_id, &payload.reason)
        .await?;
    Ok(Json(cancelled))
}

/// POST /orders/:order_id/items
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, order_id = %order_id))]
pub async fn add_items_to_order(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AddItemsRequest>,
) -> Result<(StatusCode, Json<AddItemsResponse>), AppError> {
    payload.validate()?;

    let (items, invoice) = state
        .orders
        .add_items_to_order(&ctx, order_id, &payload.test_ids, payload.rate_card_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AddItemsResponse { items, invoice }),
    ))
}

/// POST /order-items/:order_item_id/cancel
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, order_item_id = %order_item_id))]
pub async fn cancel_order_item(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(order_item_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<OrderItem>, AppError> {
    payload.validate()?;

    let item = state
        .orders
        .cancel_order_item(&ctx, order_item_id, &payload.reason)
        .await?;
    Ok(Json(item))
}
