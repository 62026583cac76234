use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::queue::QueueSummary,
    error::{AppError, ErrorBody, ServiceError},
    routes::actor::ActorHeaders,
    services::queue_service,
    state::{SharedState, actor::Actor},
};

/// Administrator-only endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/admin/queues/{id}/force-close", post(force_close_queue))
        .route_layer(middleware::from_fn(require_admin))
}

/// Close any queue regardless of ownership.
#[utoipa::path(
    post,
    path = "/admin/queues/{id}/force-close",
    tag = "admin",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Queue closed", body = QueueSummary),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
        (status = 409, description = "Queue already closed", body = ErrorBody)
    )
)]
pub async fn force_close_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueSummary>, AppError> {
    Ok(Json(
        queue_service::force_close_queue(&state, &actor, id).await?,
    ))
}

async fn require_admin(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let actor = Actor::from_request_parts(&mut parts, &()).await?;

    if !actor.is_admin() {
        warn!(actor_id = %actor.id, path = %parts.uri.path(), "admin route refused");
        return Err(ServiceError::PermissionDenied("administrator role required".into()).into());
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
