use axum::Router;

use crate::AppState;

pub mod board;
pub mod details;
pub mod health;
pub mod machines;
pub mod orders;
pub mod plans;
pub mod reports;
pub mod stats;
pub mod steps;
pub mod users;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::router(&state))
        .merge(users::router(&state))
        .merge(steps::router(&state))
        .merge(machines::router(&state))
        .merge(details::router(&state))
        .merge(orders::router(&state))
        .merge(reports::router(&state))
        .merge(plans::router(&state))
        .merge(board::router(&state))
        .merge(stats::router(&state));

    Router::new().nest("/api", api).with_state(state)
}
