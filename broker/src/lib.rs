//! AV Controls broker library.
//!
//! This module exposes the application builder for use in tests.

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod state;

use state::BrokerState;

/// Create the Axum application router.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app() -> Router {
    create_app_with_state(BrokerState::default())
}

/// Create the Axum application router with a given state.
pub fn create_app_with_state(state: BrokerState) -> Router {
    let api_router = Router::new()
        .route("/panels", get(api::panels::list_panels))
        .route("/panels/{id}", get(api::panels::get_panel))
        .route("/stats", get(api::panels::stats));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(api::websocket::websocket_handler))
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
