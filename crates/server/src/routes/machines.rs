use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::machine::{CreateMachine, Machine, UpdateMachine};
use serde::Deserialize;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct MachineQuery {
    pub step_id: Option<Uuid>,
}

pub async fn list_machines(
    State(state): State<AppState>,
    Query(query): Query<MachineQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Machine>>>, ApiError> {
    let pool = state.db().pool();
    let machines = match query.step_id {
        Some(step_id) => Machine::find_by_step_id(pool, step_id).await?,
        None => Machine::find_all(pool).await?,
    };
    Ok(ResponseJson(ApiResponse::success(machines)))
}

pub async fn create_machine(
    State(state): State<AppState>,
    Json(payload): Json<CreateMachine>,
) -> Result<ResponseJson<ApiResponse<Machine>>, ApiError> {
    let machine = Machine::create(state.db().pool(), &payload).await?;
    info!(machine_id = %machine.id, step_id = ?machine.step_id, "Machine created");
    Ok(ResponseJson(ApiResponse::success(machine)))
}

pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Machine>>, ApiError> {
    let machine = Machine::find_by_id(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("machine"))?;
    Ok(ResponseJson(ApiResponse::success(machine)))
}

pub async fn update_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMachine>,
) -> Result<ResponseJson<ApiResponse<Machine>>, ApiError> {
    let machine = Machine::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("machine"))?;
    Ok(ResponseJson(ApiResponse::success(machine)))
}

pub async fn delete_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Machine::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("machine"));
    }
    info!(machine_id = %id, "Machine deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/machines", get(list_machines).post(create_machine))
        .route(
            "/machines/{id}",
            get(get_machine).put(update_machine).delete(delete_machine),
        )
}
