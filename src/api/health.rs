use axum::{http::StatusCode, response::IntoResponse};

/// GET /healthz - liveness only, never touches the providers
pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
