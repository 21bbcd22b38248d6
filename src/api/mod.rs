pub mod error;
pub mod health;
pub mod sensors;
pub mod status;
pub mod v1;

use axum::{routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.cfg.server.request_timeout_secs);
    Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api/v1", v1::router(state))
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(timeout)))
        .layer(TraceLayer::new_for_http())
}
