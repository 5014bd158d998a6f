use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    detail::Detail,
    order::{CreateOrder, Order, OrderWithEntries, UpdateOrder},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SetOrderActive {
    pub is_active: bool,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Order>>>, ApiError> {
    let pool = state.db().pool();
    let orders = match query.active {
        Some(true) => Order::find_active(pool).await?,
        Some(false) => Order::find_all(pool)
            .await?
            .into_iter()
            .filter(|o| !o.is_active)
            .collect(),
        None => Order::find_all(pool).await?,
    };
    Ok(ResponseJson(ApiResponse::success(orders)))
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrder>,
) -> Result<ResponseJson<ApiResponse<OrderWithEntries>>, ApiError> {
    let order = Order::create(state.db().pool(), &payload).await?;
    info!(
        order_id = %order.id,
        number = %order.number,
        entries = order.entries.len(),
        "Order created"
    );
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<OrderWithEntries>>, ApiError> {
    let order = Order::find_with_entries(state.db().pool(), id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrder>,
) -> Result<ResponseJson<ApiResponse<OrderWithEntries>>, ApiError> {
    let order = Order::update(state.db().pool(), id, &payload)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn set_order_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetOrderActive>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    let pool = state.db().pool();
    if Order::set_active(pool, id, payload.is_active).await? == 0 {
        return Err(ApiError::NotFound("order"));
    }
    info!(order_id = %id, is_active = payload.is_active, "Order activity changed");
    let order = Order::find_by_id(pool, id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Order::delete(state.db().pool(), id).await? == 0 {
        return Err(ApiError::NotFound("order"));
    }
    info!(order_id = %id, "Order deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Details ordered by an order, for populating report and plan entry forms.
pub async fn get_order_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Detail>>>, ApiError> {
    let pool = state.db().pool();
    if Order::find_by_id(pool, id).await?.is_none() {
        return Err(ApiError::NotFound("order"));
    }
    let details = Detail::find_by_order_id(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(details)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route(
            "/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/orders/{id}/active", post(set_order_active))
        .route("/orders/{id}/details", get(get_order_details))
}
