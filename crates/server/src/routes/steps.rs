use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    machine::Machine,
    step::{CreateStep, Step, UpdateStep},
};
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

pub async fn list_steps(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Step>>>, ApiError> {
    let steps = Step::find_all(state.db().pool()).await?;
    Ok(ResponseJson(ApiResponse::success(steps)))
}

pub async fn create_step(
    State(state): State<AppState>,
    Json(payload): Json<CreateStep>,
) -> Result<ResponseJson<ApiResponse<Step>>, ApiError> {
    let step = Step::create(state.db().pool(), &payload).await?;
    info!(step_id = %step.id, position = step.position, "Step created");
    Ok(ResponseJson(ApiResponse::success(step)))
}

pub async fn get_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Step>>, ApiError> {
    let step = Step::find_by_id(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("step"))?;
    Ok(ResponseJson(ApiResponse::success(step)))
}

pub async fn update_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStep>,
) -> Result<ResponseJson<ApiResponse<Step>>, ApiError> {
    let step = Step::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("step"))?;
    Ok(ResponseJson(ApiResponse::success(step)))
}

pub async fn delete_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Step::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("step"));
    }
    info!(step_id = %id, "Step deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Machines of a step, for populating report and plan forms.
pub async fn get_step_machines(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Machine>>>, ApiError> {
    let pool = state.db().pool();
    if Step::find_by_id(pool, id).await?.is_none() {
        return Err(ApiError::NotFound("step"));
    }
    let machines = Machine::find_by_step_id(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(machines)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/steps", get(list_steps).post(create_step))
        .route(
            "/steps/{id}",
            get(get_step).put(update_step).delete(delete_step),
        )
        .route("/steps/{id}/machines", get(get_step_machines))
}
