use axum::{routing::get, Router};

use super::{sensors, status};
use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/sensors/lowest-price", get(sensors::lowest_price))
        .route("/sensors/price-level", get(sensors::price_level))
        .route("/sensors/peaks/:name", get(sensors::peak))
        .with_state(state)
}
