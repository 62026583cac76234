//! Library crate for turnstile-back, exposing modules for binaries and integration tests.

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Runtime configuration.
pub mod config;
/// Persistence.
pub mod dao;
/// Wire types.
pub mod dto;
/// Error taxonomy and HTTP mapping.
pub mod error;
/// HTTP handlers.
pub mod routes;
/// Application services.
pub mod services;
/// Shared state and the queue state machines.
pub mod state;

/// Build the top-level router and attach cross-cutting middleware layers.
pub fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
