use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document served at `/api-doc/openapi.json`.
#[openapi(
    info(title = "turnstile-back", description = "Scheduled turn-taking queues"),
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::queue_stream,
        crate::routes::queues::list_queues,
        crate::routes::queues::create_queue,
        crate::routes::queues::get_queue,
        crate::routes::queues::update_queue,
        crate::routes::queues::delete_queue,
        crate::routes::queues::list_participants,
        crate::routes::queues::join_queue,
        crate::routes::queues::leave_queue,
        crate::routes::queues::complete_turn,
        crate::routes::queues::close_queue,
        crate::routes::admin::force_close_queue,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::queue::CreateQueueRequest,
            crate::dto::queue::UpdateQueueRequest,
            crate::dto::queue::QueueSummary,
            crate::dto::queue::QueueDetail,
            crate::dto::queue::StatusFilter,
            crate::dto::participant::ParticipantView,
            crate::dto::participant::ActionResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::QueueEvent,
            crate::dto::sse::QueueDeletedEvent,
            crate::dto::sse::ParticipantsChangedEvent,
            crate::error::ErrorBody,
            crate::error::ErrorKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "queues", description = "Queue scheduling and management"),
        (name = "turns", description = "Joining, leaving and completing turns"),
        (name = "admin", description = "Administrator operations"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_queue_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/queues",
            "/queues/{id}",
            "/queues/{id}/join",
            "/queues/{id}/complete",
            "/admin/queues/{id}/force-close",
            "/sse/queues",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
