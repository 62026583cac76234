use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/queues",
    tag = "sse",
    responses((status = 200, description = "Queue event stream", content_type = "text/event-stream", body = String))
)]
/// Stream queue lifecycle and participant events to connected frontends.
pub async fn queue_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (receiver, handshake) = sse_service::subscribe_queues(&state);
    info!(subscribers = state.sse().subscriber_count(), "new queue SSE connection");
    sse_service::to_sse_stream(receiver, handshake)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/queues", get(queue_stream))
}
