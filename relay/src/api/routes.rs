//! API Routes

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::handlers::{self, ApiState};

/// Create the relay router with all routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info))
        .route("/relay/transfer", post(handlers::relay_transfer))
        .route("/relay/unshield", post(handlers::relay_unshield))
        .route("/relay/status/{tx_id}", get(handlers::relay_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
