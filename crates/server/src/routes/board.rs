use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::board::Board;
use services::services::shift_clock::{BoardNavigation, ShiftClock};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

pub async fn get_board(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    let board = ShiftClock::board(state.db().pool(), Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

/// Move the board clock: `back`, `forward` or `today`.
pub async fn navigate_board(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    let navigation = BoardNavigation::parse(&value)?;
    let board = ShiftClock::navigate(state.db().pool(), navigation, Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub async fn switch_board_step(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Board>>, ApiError> {
    let board = ShiftClock::switch_step(state.db().pool(), step_id, Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/board", get(get_board))
        .route("/board/navigate/{value}", post(navigate_board))
        .route("/board/step/{step_id}", post(switch_board_step))
}
