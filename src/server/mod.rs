pub mod health;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::ServerConfig;
use crate::service::StepService;

/// Shared application state for the Axum server.
pub struct AppState {
    pub service: Arc<StepService>,
    pub config: Arc<ServerConfig>,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/uptime", get(health::uptime))
        .route(
            "/jobs/{job_id}/steps",
            axum::routing::post(routes::create_steps)
                .put(routes::update_steps)
                .delete(routes::delete_steps),
        )
        .route(
            "/jobs/{job_id}/steps/{uuid}",
            get(routes::get_step).put(routes::update_step),
        )
        .route("/jobs/{job_id}/result", get(routes::job_result))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
