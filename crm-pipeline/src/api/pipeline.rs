//! Pipeline stage endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use crm_common::db::PipelineStage;
use crm_common::Stage;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::services::summary::{summarize, PipelineSummary};
use crate::AppState;

/// Response of the recalculation endpoint
#[derive(Debug, Serialize)]
pub struct RecalculationResponse {
    pub stages: Vec<PipelineStage>,
}

/// GET /api/pipeline
///
/// All stage rows that exist, in pipeline order.
pub async fn list_stages(State(state): State<AppState>) -> ApiResult<Json<Vec<PipelineStage>>> {
    Ok(Json(state.reconciler.stages().await?))
}

/// GET /api/pipeline/:stage
pub async fn get_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> ApiResult<Json<PipelineStage>> {
    let stage: Stage = stage.parse()?;
    state
        .reconciler
        .stage(stage)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No pipeline data for stage {}", stage)))
}

/// GET /api/pipeline/summary
pub async fn get_summary(State(state): State<AppState>) -> ApiResult<Json<PipelineSummary>> {
    let rows = state.reconciler.stages().await?;
    let occupancy = state.leads.current_occupancy().await?;
    Ok(Json(summarize(&rows, &occupancy)))
}

/// PUT /pipeline/recalculate/conversion-rates
///
/// Operator repair action: recompute every stage's conversion rate now.
pub async fn recalculate_conversion_rates(
    State(state): State<AppState>,
) -> ApiResult<Json<RecalculationResponse>> {
    let stages = state.reconciler.recalculate_conversion_rates().await?;
    Ok(Json(RecalculationResponse { stages }))
}
