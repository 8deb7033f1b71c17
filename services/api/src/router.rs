//! Axum Router Configuration
//!
//! Defines the HTTP routing for the service: the health probes and the
//! WebSocket voice endpoint.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::readiness))
        .route("/health", get(handlers::liveness))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
