//! Read-only production statistics: the shift table, fulfillment ledgers and
//! per-order running balances.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use services::services::{
    fulfillment::{FulfillmentService, OrderBalance, StepFulfillment},
    shift::ShiftGrid,
    shift_clock::ShiftClock,
};
use tracing::debug;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError, routes::plans::grid_size};

#[derive(Debug, Deserialize)]
pub struct ShiftTableQuery {
    pub shifts: Option<usize>,
    /// Defaults to the board's current step.
    pub step_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentQuery {
    pub step_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub step_id: Option<Uuid>,
    pub shifts: Option<usize>,
    /// Defaults to the board clock.
    pub origin: Option<DateTime<Utc>>,
}

/// Shift × machine table of the board's window, materialising plans for empty cells.
pub async fn shift_table(
    State(state): State<AppState>,
    Query(query): Query<ShiftTableQuery>,
) -> Result<ResponseJson<ApiResponse<ShiftGrid>>, ApiError> {
    let pool = state.db().pool();
    let count = grid_size(&state, query.shifts)?;
    let board = ShiftClock::board(pool, Utc::now()).await?;
    let step_id = query.step_id.or(board.current_step_id);
    let grid = ShiftGrid::build(pool, step_id, board.clock_date, count).await?;
    debug!(
        step_id = ?step_id,
        rows = grid.rows.len(),
        plans_created = grid.plans_created,
        "Shift table built"
    );
    Ok(ResponseJson(ApiResponse::success(grid)))
}

pub async fn step_fulfillment(
    State(state): State<AppState>,
    Query(query): Query<FulfillmentQuery>,
) -> Result<ResponseJson<ApiResponse<StepFulfillment>>, ApiError> {
    let pool = state.db().pool();
    let now = Utc::now();
    let step_id = match query.step_id {
        Some(step_id) => step_id,
        None => ShiftClock::board(pool, now)
            .await?
            .current_step_id
            .ok_or_else(|| ApiError::bad_request("no step selected"))?,
    };
    let fulfillment = FulfillmentService::for_step(pool, step_id, now).await?;
    Ok(ResponseJson(ApiResponse::success(fulfillment)))
}

pub async fn overview(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<StepFulfillment>>>, ApiError> {
    let steps = FulfillmentService::overview(state.db().pool(), Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(steps)))
}

pub async fn order_balance(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> Result<ResponseJson<ApiResponse<OrderBalance>>, ApiError> {
    let pool = state.db().pool();
    let count = grid_size(&state, query.shifts)?;
    let board = ShiftClock::board(pool, Utc::now()).await?;
    let step_id = query
        .step_id
        .or(board.current_step_id)
        .ok_or_else(|| ApiError::bad_request("no step selected"))?;
    let origin = query.origin.unwrap_or(board.clock_date);
    let balance = FulfillmentService::order_balance(pool, order_id, step_id, origin, count).await?;
    Ok(ResponseJson(ApiResponse::success(balance)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/stats",
        Router::new()
            .route("/shift-table", get(shift_table))
            .route("/fulfillment", get(step_fulfillment))
            .route("/overview", get(overview))
            .route("/orders/{id}/balance", get(order_balance)),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use services::services::shift::shift_start;

    use crate::routes::test_support::{get, post, seed_line, send, test_state};

    #[tokio::test]
    async fn shift_table_materialises_plans_once() {
        let state = test_state().await;
        let line = seed_line(&state).await;
        send(
            &state,
            Method::POST,
            &format!("/api/board/step/{}", line.step_id),
            None,
        )
        .await;

        let (status, first) = get(&state, "/api/stats/shift-table?shifts=4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["rows"].as_array().unwrap().len(), 4);
        assert_eq!(first["data"]["plans_created"], 4);
        assert_eq!(first["data"]["rows"][0]["cells"][0]["status"], "plan");

        let (_, second) = get(&state, "/api/stats/shift-table?shifts=4").await;
        assert_eq!(second["data"]["plans_created"], 0);

        let (status, _) = get(&state, "/api/stats/shift-table?shifts=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fulfillment_counts_reports_and_current_plans() {
        let state = test_state().await;
        let line = seed_line(&state).await;
        let now = Utc::now();
        post(
            &state,
            "/api/reports",
            json!({
                "user_id": null,
                "date": now - TimeDelta::days(1),
                "order_id": line.order_id,
                "step_id": line.step_id,
                "entries": [{ "machine_id": line.machine_id, "detail_id": line.detail_id, "quantity": 30 }],
            }),
        )
        .await;
        post(
            &state,
            "/api/plans",
            json!({
                "date": shift_start(now) + TimeDelta::hours(12),
                "machine_id": line.machine_id,
                "step_id": line.step_id,
                "entries": [{ "order_id": line.order_id, "detail_id": line.detail_id, "quantity": 50 }],
            }),
        )
        .await;

        let uri = format!("/api/stats/fulfillment?step_id={}", line.step_id);
        let (status, body) = get(&state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let totals = &body["data"]["totals"];
        assert_eq!(totals["ordered"], 100);
        assert_eq!(totals["reported"], 30);
        assert_eq!(totals["planned"], 50);
        assert_eq!(totals["leftover"], 70);
        assert_eq!(totals["leftover_with_plan"], 20);

        let (_, overview) = get(&state, "/api/stats/overview").await;
        assert_eq!(overview["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fulfillment_without_step_is_bad_request() {
        let state = test_state().await;
        let (status, _) = get(&state, "/api/stats/fulfillment").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn order_balance_walks_the_window() {
        let state = test_state().await;
        let line = seed_line(&state).await;
        post(
            &state,
            "/api/reports",
            json!({
                "user_id": null,
                "date": "2024-03-02T03:00:00Z",
                "order_id": line.order_id,
                "step_id": line.step_id,
                "entries": [{ "machine_id": line.machine_id, "detail_id": line.detail_id, "quantity": 10 }],
            }),
        )
        .await;
        post(
            &state,
            "/api/plans",
            json!({
                "date": "2024-03-02T12:00:00Z",
                "machine_id": line.machine_id,
                "step_id": line.step_id,
                "entries": [{ "order_id": line.order_id, "detail_id": line.detail_id, "quantity": 25 }],
            }),
        )
        .await;

        let uri = format!(
            "/api/stats/orders/{}/balance?step_id={}&shifts=2&origin=2024-03-02T00:00:00Z",
            line.order_id, line.step_id
        );
        let (status, body) = get(&state, &uri).await;
        assert_eq!(status, StatusCode::OK);
        let points = body["data"]["points"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["source"], "actual");
        assert_eq!(points[0]["leftover"], 90);
        assert_eq!(points[1]["source"], "planned");
        assert_eq!(points[1]["projected_leftover"], 65);

        let missing = format!(
            "/api/stats/orders/{}/balance?step_id={}",
            uuid::Uuid::new_v4(),
            line.step_id
        );
        let (status, _) = get(&state, &missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
