use axum::Router;

use crate::state::SharedState;

/// Actor extraction from request headers.
pub mod actor;
/// Administrator endpoints.
pub mod admin;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health endpoint.
pub mod health;
/// Queue and turn endpoints.
pub mod queues;
/// Event stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(queues::router())
        .merge(admin::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
