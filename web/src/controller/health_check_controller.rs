use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET /health
///
/// Liveness probe; responds as long as the router is serving requests, even
/// while the hub is shutting down.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
