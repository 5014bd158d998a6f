use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::detail::{CreateDetail, Detail, UpdateDetail};
use services::services::catalog::{CatalogService, DuplicateGroup, MergeSummary};
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

pub async fn list_details(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Detail>>>, ApiError> {
    let details = Detail::find_all(state.db().pool()).await?;
    Ok(ResponseJson(ApiResponse::success(details)))
}

pub async fn create_detail(
    State(state): State<AppState>,
    Json(payload): Json<CreateDetail>,
) -> Result<ResponseJson<ApiResponse<Detail>>, ApiError> {
    let detail = Detail::create(state.db().pool(), &payload).await?;
    info!(detail_id = %detail.id, name = %detail.name, "Detail created");
    Ok(ResponseJson(ApiResponse::success(detail)))
}

pub async fn get_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Detail>>, ApiError> {
    let detail = Detail::find_by_id(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("detail"))?;
    Ok(ResponseJson(ApiResponse::success(detail)))
}

pub async fn update_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDetail>,
) -> Result<ResponseJson<ApiResponse<Detail>>, ApiError> {
    let detail = Detail::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("detail"))?;
    Ok(ResponseJson(ApiResponse::success(detail)))
}

pub async fn delete_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Detail::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("detail"));
    }
    info!(detail_id = %id, "Detail deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn list_duplicates(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<DuplicateGroup>>>, ApiError> {
    let groups = CatalogService::find_duplicates(state.db().pool()).await?;
    Ok(ResponseJson(ApiResponse::success(groups)))
}

pub async fn merge_duplicates(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<MergeSummary>>, ApiError> {
    let summary = CatalogService::merge_duplicates(state.db().pool()).await?;
    info!(
        groups = summary.groups,
        details_removed = summary.details_removed,
        "Duplicate details merged"
    );
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/details", get(list_details).post(create_detail))
        .route("/details/duplicates", get(list_duplicates))
        .route("/details/duplicates/merge", post(merge_duplicates))
        .route(
            "/details/{id}",
            get(get_detail).put(update_detail).delete(delete_detail),
        )
}
