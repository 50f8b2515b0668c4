use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct UptimeResponse {
    pub service: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /uptime
pub async fn uptime(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Uptime check");
    let response = UptimeResponse {
        service: "OK".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}
