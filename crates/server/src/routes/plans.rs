use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Utc};
use db::models::plan::{CreatePlan, CreatePlanEntry, Plan, PlanWithEntries};
use serde::{Deserialize, Serialize};
use services::services::{
    shift::{MAX_GRID_SHIFTS, shift_start, shift_window, window_bounds},
    shift_clock::ShiftClock,
};
use tracing::info;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    pub step_id: Option<Uuid>,
    /// Defaults to the board clock.
    pub origin: Option<DateTime<Utc>>,
    pub shifts: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdatePlanEntries {
    pub entries: Vec<CreatePlanEntry>,
}

/// Resolve a requested grid size against the configured default.
pub(crate) fn grid_size(state: &AppState, shifts: Option<usize>) -> Result<usize, ApiError> {
    let count = shifts.unwrap_or(state.config().shift_grid_size);
    if count == 0 || count > MAX_GRID_SHIFTS {
        return Err(ApiError::bad_request(format!(
            "shifts must be between 1 and {MAX_GRID_SHIFTS}, got {count}"
        )));
    }
    Ok(count)
}

pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<PlanQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Plan>>>, ApiError> {
    let pool = state.db().pool();
    let step_id = query
        .step_id
        .ok_or_else(|| ApiError::bad_request("step_id is required"))?;
    let count = grid_size(&state, query.shifts)?;
    let origin = match query.origin {
        Some(origin) => origin,
        None => ShiftClock::board(pool, Utc::now()).await?.clock_date,
    };
    let (from, to) = window_bounds(&shift_window(origin, count));
    let plans = Plan::find_in_window(pool, step_id, from, to).await?;
    Ok(ResponseJson(ApiResponse::success(plans)))
}

/// Fill the plan of a (machine, shift) slot, creating it when the slot has none.
/// The date may be any instant inside the shift.
pub async fn upsert_plan(
    State(state): State<AppState>,
    Json(mut payload): Json<CreatePlan>,
) -> Result<ResponseJson<ApiResponse<PlanWithEntries>>, ApiError> {
    payload.date = shift_start(payload.date);
    let plan = Plan::upsert(state.db().pool(), &payload).await?;
    info!(
        plan_id = %plan.id,
        machine_id = %plan.machine_id,
        shift = %plan.date,
        entries = plan.entries.len(),
        "Plan saved"
    );
    Ok(ResponseJson(ApiResponse::success(plan)))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<PlanWithEntries>>, ApiError> {
    let plan = Plan::find_with_entries(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("plan"))?;
    Ok(ResponseJson(ApiResponse::success(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanEntries>,
) -> Result<ResponseJson<ApiResponse<PlanWithEntries>>, ApiError> {
    let plan = Plan::set_entries(state.db().pool(), id, &payload.entries)
        .await?
        .ok_or(ApiError::NotFound("plan"))?;
    Ok(ResponseJson(ApiResponse::success(plan)))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Plan::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("plan"));
    }
    info!(plan_id = %id, "Plan deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans).post(upsert_plan))
        .route(
            "/plans/{id}",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
}
