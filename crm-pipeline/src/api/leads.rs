//! Lead endpoints
//!
//! Creation and status changes feed the pipeline aggregate; manual edits and
//! deletes do not.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use crm_common::db::Lead;
use crm_common::LeadStatus;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::leads::{LeadPage, LeadQuery, LeadUpdate, NewLead, PublicLeadForm};
use crate::AppState;

/// Body of `PUT /api/leads/:id/status`
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: LeadStatus,
}

/// Unwrap a JSON body, reporting malformed input as 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Unwrap query parameters, reporting unparseable ones as 400
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Unwrap a lead id from the path, reporting a malformed id as 400
pub(crate) fn lead_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// POST /api/leads
pub async fn create_lead(
    State(state): State<AppState>,
    payload: Result<Json<NewLead>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = state.leads.create_lead(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

/// POST /api/public/leads
pub async fn capture_public_lead(
    State(state): State<AppState>,
    payload: Result<Json<PublicLeadForm>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = state.leads.capture_public_lead(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/leads?page=&status=&source=&assigned_to=
pub async fn list_leads(
    State(state): State<AppState>,
    query: Result<Query<LeadQuery>, QueryRejection>,
) -> ApiResult<Json<LeadPage>> {
    let query = query_params(query)?;
    Ok(Json(state.leads.list_leads(&query).await?))
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.leads.get_lead(lead_id(id)?).await?))
}

/// PUT /api/leads/:id
pub async fn update_lead(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<LeadUpdate>, JsonRejection>,
) -> ApiResult<Json<Lead>> {
    let lead = state
        .leads
        .update_lead(lead_id(id)?, json_body(payload)?)
        .await?;
    Ok(Json(lead))
}

/// PUT /api/leads/:id/status
pub async fn update_lead_status(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<Lead>> {
    let id = lead_id(id)?;
    let request = json_body(payload)?;
    let lead = state.leads.update_lead_status(id, request.status).await?;
    Ok(Json(lead))
}

/// DELETE /api/leads/:id
pub async fn delete_lead(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    state.leads.delete_lead(lead_id(id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
