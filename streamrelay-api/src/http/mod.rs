// Module: http
// HTTP/WebSocket surface for the relay

pub mod error;
pub mod health;
pub mod relay;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use streamrelay_core::RelayRegistry;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RelayRegistry>,
}

/// Create the HTTP router with all routes
pub fn create_router(registry: Arc<RelayRegistry>) -> Router {
    let state = AppState { registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::create_health_router())
        .route("/{stream}/init", post(relay::init_stream))
        .route("/{stream}/ws", get(relay::stream_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
