use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        participant::{ActionResponse, ParticipantView},
        queue::{
            CreateQueueRequest, ListQueuesQuery, QueueDetail, QueueSummary, UpdateQueueRequest,
        },
    },
    error::{AppError, ErrorBody},
    routes::actor::ActorHeaders,
    services::queue_service,
    state::{SharedState, actor::Actor},
};

/// Queue management and turn-taking endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/queues", get(list_queues).post(create_queue))
        .route(
            "/queues/{id}",
            get(get_queue).patch(update_queue).delete(delete_queue),
        )
        .route("/queues/{id}/participants", get(list_participants))
        .route("/queues/{id}/join", post(join_queue))
        .route("/queues/{id}/leave", post(leave_queue))
        .route("/queues/{id}/complete", post(complete_turn))
        .route("/queues/{id}/close", post(close_queue))
}

/// List queues visible to the caller.
#[utoipa::path(
    get,
    path = "/queues",
    tag = "queues",
    params(ActorHeaders, ListQueuesQuery),
    responses(
        (status = 200, description = "Visible queues", body = [QueueSummary]),
        (status = 401, description = "Missing actor headers", body = ErrorBody)
    )
)]
pub async fn list_queues(
    State(state): State<SharedState>,
    actor: Actor,
    Query(query): Query<ListQueuesQuery>,
) -> Result<Json<Vec<QueueSummary>>, AppError> {
    Ok(Json(queue_service::list_queues(&state, &actor, query).await?))
}

/// Schedule a new queue owned by the caller.
#[utoipa::path(
    post,
    path = "/queues",
    tag = "queues",
    params(ActorHeaders),
    request_body = CreateQueueRequest,
    responses(
        (status = 201, description = "Queue created", body = QueueSummary),
        (status = 400, description = "Invalid input or schedule window", body = ErrorBody),
        (status = 409, description = "Same slot already scheduled", body = ErrorBody)
    )
)]
pub async fn create_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<CreateQueueRequest>>,
) -> Result<(StatusCode, Json<QueueSummary>), AppError> {
    let queue = queue_service::create_queue(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(queue)))
}

/// Queue with its participants in wait order.
#[utoipa::path(
    get,
    path = "/queues/{id}",
    tag = "queues",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Queue detail", body = QueueDetail),
        (status = 403, description = "Queue not open to the caller's groups", body = ErrorBody),
        (status = 404, description = "Unknown queue", body = ErrorBody)
    )
)]
pub async fn get_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueDetail>, AppError> {
    Ok(Json(queue_service::get_queue(&state, &actor, id).await?))
}

/// Edit queue attributes. Owner or administrator.
#[utoipa::path(
    patch,
    path = "/queues/{id}",
    tag = "queues",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    request_body = UpdateQueueRequest,
    responses(
        (status = 200, description = "Queue updated", body = QueueSummary),
        (status = 400, description = "Invalid edit", body = ErrorBody),
        (status = 403, description = "Caller may not manage this queue", body = ErrorBody),
        (status = 409, description = "Schedule of a closed queue", body = ErrorBody)
    )
)]
pub async fn update_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateQueueRequest>>,
) -> Result<Json<QueueSummary>, AppError> {
    Ok(Json(
        queue_service::update_queue(&state, &actor, id, payload).await?,
    ))
}

/// Delete a queue and its participants. Owner or administrator.
#[utoipa::path(
    delete,
    path = "/queues/{id}",
    tag = "queues",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Queue deleted", body = ActionResponse),
        (status = 403, description = "Caller may not manage this queue", body = ErrorBody),
        (status = 404, description = "Unknown queue", body = ErrorBody)
    )
)]
pub async fn delete_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(queue_service::delete_queue(&state, &actor, id).await?))
}

/// Participants of a queue in wait order.
#[utoipa::path(
    get,
    path = "/queues/{id}/participants",
    tag = "queues",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Participants", body = [ParticipantView]),
        (status = 404, description = "Unknown queue", body = ErrorBody)
    )
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantView>>, AppError> {
    Ok(Json(
        queue_service::list_participants(&state, &actor, id).await?,
    ))
}

/// Join the end of the queue.
#[utoipa::path(
    post,
    path = "/queues/{id}/join",
    tag = "turns",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Joined", body = ParticipantView),
        (status = 403, description = "Caller's groups are not eligible", body = ErrorBody),
        (status = 409, description = "Already in the queue or queue closed", body = ErrorBody)
    )
)]
pub async fn join_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantView>, AppError> {
    Ok(Json(queue_service::join_queue(&state, &actor, id).await?))
}

/// Leave the queue.
#[utoipa::path(
    post,
    path = "/queues/{id}/leave",
    tag = "turns",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Left", body = ActionResponse),
        (status = 404, description = "Caller is not in the queue", body = ErrorBody)
    )
)]
pub async fn leave_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(queue_service::leave_queue(&state, &actor, id).await?))
}

/// Finish the caller's turn and pass it on.
#[utoipa::path(
    post,
    path = "/queues/{id}/complete",
    tag = "turns",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Turn completed", body = QueueDetail),
        (status = 403, description = "Not the caller's turn", body = ErrorBody),
        (status = 409, description = "Queue closed", body = ErrorBody)
    )
)]
pub async fn complete_turn(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueDetail>, AppError> {
    Ok(Json(queue_service::complete_turn(&state, &actor, id).await?))
}

/// Close the queue before its scheduled end. Owner only.
#[utoipa::path(
    post,
    path = "/queues/{id}/close",
    tag = "queues",
    params(ActorHeaders, ("id" = Uuid, Path, description = "Queue identifier")),
    responses(
        (status = 200, description = "Queue closed", body = QueueSummary),
        (status = 403, description = "Caller does not own the queue", body = ErrorBody),
        (status = 409, description = "Queue already closed", body = ErrorBody)
    )
)]
pub async fn close_queue(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueSummary>, AppError> {
    Ok(Json(queue_service::close_queue(&state, &actor, id).await?))
}
