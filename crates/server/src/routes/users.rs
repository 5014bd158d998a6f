use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::{CreateUser, UpdateUser, User, UserRole};
use serde::Deserialize;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    let pool = state.db().pool();
    let users = match query.role {
        Some(role) => User::find_by_role(pool, role).await?,
        None => User::find_all(pool).await?,
    };
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::create(state.db().pool(), &payload).await?;
    info!(user_id = %user.id, role = %user.role, "User created");
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::find_by_id(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if User::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("user"));
    }
    info!(user_id = %id, "User deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}
