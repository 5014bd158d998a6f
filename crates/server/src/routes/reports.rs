use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::report::{CreateReport, Report, ReportWithEntries};
use serde::Deserialize;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub step_id: Option<Uuid>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Report>>>, ApiError> {
    let pool = state.db().pool();
    let reports = match query.step_id {
        Some(step_id) => Report::find_by_step_id(pool, step_id).await?,
        None => Report::find_all(pool).await?,
    };
    Ok(ResponseJson(ApiResponse::success(reports)))
}

pub async fn create_report(
    State(state): State<AppState>,
    Json(payload): Json<CreateReport>,
) -> Result<ResponseJson<ApiResponse<ReportWithEntries>>, ApiError> {
    let report = Report::create(state.db().pool(), &payload).await?;
    info!(
        report_id = %report.id,
        step_id = %report.step_id,
        order_id = %report.order_id,
        entries = report.entries.len(),
        "Report filed"
    );
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ReportWithEntries>>, ApiError> {
    let report = Report::find_with_entries(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("report"))?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateReport>,
) -> Result<ResponseJson<ApiResponse<ReportWithEntries>>, ApiError> {
    let report = Report::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("report"))?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Report::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("report"));
    }
    info!(report_id = %id, "Report deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route(
            "/reports/{id}",
            get(get_report).put(update_report).delete(delete_report),
        )
}
