use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;

use keystone_core::health::{healthz, readiness};
use keystone_core::middleware::request_id_layer;

use crate::state::AppState;

/// Probe endpoints. The account operations are consumed in-process.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

async fn readyz(State(state): State<AppState>) -> StatusCode {
    readiness(state.db.ping().await)
}
