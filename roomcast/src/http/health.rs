//! Health check endpoint for monitoring probes

use axum::{response::IntoResponse, routing::get, Router};

use crate::http::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(health_check))
}

/// Always OK while the process serves requests
pub async fn health_check() -> impl IntoResponse {
    "ok"
}
