//! Patient registration and lookup handlers.

use crate::dtos::patients::{ListPatientsQuery, RegisterPatientRequest, UpdatePatientRequest};
use crate::middleware::auth::AuthContext;
use crate::models::{CreatePatient, ListPatientsFilter, Patient, UpdatePatient};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// POST /patients
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id))]
pub async fn register_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    payload.validate()?;

    let input = CreatePatient {
        full_name: payload.full_name,
        sex: payload.sex,
        date_of_birth: payload.date_of_birth,
        phone: payload.phone,
        email: payload.email,
        address_line: payload.address_line,
    };

    let patient = state.patients.register(&ctx, &input).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /patients
#[tracing::instrument(skip(state, ctx, query), fields(lab_id = %ctx.lab_id))]
pub async fn list_patients(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListPatientsQuery>,
) -> Result<Json<Vec<Patient>>, AppError> {
    let filter = ListPatientsFilter {
        search: query.search,
        page_size: query.page_size,
        page_token: query.page_token,
    };

    let patients = state.patients.list_patients(&ctx, &filter).await?;
    Ok(Json(patients))
}

/// GET /patients/:patient_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, patient_id = %patient_id))]
pub async fn get_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Patient>, AppError> {
    let patient = state.patients.get_patient(&ctx, patient_id).await?;
    Ok(Json(patient))
}

/// PATCH /patients/:patient_id
#[tracing::instrument(skip(state, ctx, payload), fields(lab_id = %ctx.lab_id, patient_id = %patient_id))]
pub async fn update_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(payload): Json<UpdatePatientRequest>,
) -> Result<Json<Patient>, AppError> {
    payload.validate()?;

    let input = UpdatePatient {
        full_name: payload.full_name,
        sex: payload.sex,
        date_of_birth: payload.date_of_birth,
        phone: payload.phone,
        email: payload.email,
        address_line: payload.address_line,
    };

    let patient = state.patients.update(&ctx, patient_id, &input).await?;
    Ok(Json(patient))
}

/// DELETE /patients/:patient_id
#[tracing::instrument(skip(state, ctx), fields(lab_id = %ctx.lab_id, patient_id = %patient_id))]
pub async fn delete_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.patients.soft_delete(&ctx, patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
