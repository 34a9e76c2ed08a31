//! Test catalog and rate card handlers.

use crate::dtos::catalog::{CreateRateCardRequest, CreateTestDefinitionRequest};
use crate::middleware::auth::AuthContext;
use crate::models::{
    Action, CreateRateCard, CreateTestDefinition, NewTestParameter, RateCard, TestDefinition,
};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

/// POST /catalog/tests
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id))]
pub async fn create_test_definition(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateTestDefinitionRequest>,
) -> Result<(StatusCode, Json<TestDefinition>), AppError> {
    ctx.require(Action::ManageCatalog)?;
    payload.validate()?;

    let input = CreateTestDefinition {
        code: payload.code,
        name: payload.name,
        specimen_type: payload.specimen_type,
        default_price: payload.default_price,
        parameters: payload
            .parameters
            .into_iter()
            .map(|p| NewTestParameter {
                name: p.name,
                unit: p.unit,
                reference_range: p.reference_range,
            })
            .collect(),
    };

    let test = state.db.create_test_definition(ctx.lab_id, &input).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// GET /catalog/tests
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id))]
pub async fn list_test_definitions(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<TestDefinition>>, AppError> {
    let tests = state.db.list_test_definitions(ctx.lab_id).await?;
    Ok(Json(tests))
}

/// GET /catalog/rate-cards
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id))]
pub async fn list_rate_cards(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<RateCard>>, AppError> {
    let rate_cards = state.db.list_rate_cards(ctx.lab_id).await?;
    Ok(Json(rate_cards))
}

/// POST /catalog/rate-cards
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id))]
pub async fn create_rate_card(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateRateCardRequest>,
) -> Result<(StatusCode, Json<RateCard>), AppError> {
    ctx.require(Action::ManageCatalog)?;
    payload.validate()?;

    let input = CreateRateCard {
        name: payload.name,
        items: payload.items.into_iter().map(|i| (i.test_id, i.price)).collect(),
    };

    let rate_card = state.db.create_rate_card(ctx.lab_id, &input).await?;
    Ok((StatusCode::CREATED, Json(rate_card)))
}
