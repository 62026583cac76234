use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        participant::ParticipantView,
        queue::QueueSummary,
        sse::{ParticipantsChangedEvent, QueueDeletedEvent, QueueEvent, ServerEvent, SystemStatus},
    },
    state::{
        SharedState,
        queue::{QueueBoard, QueueId},
    },
};

/// A queue was created.
pub const EVENT_QUEUE_CREATED: &str = "queue.created";
/// Queue attributes changed.
pub const EVENT_QUEUE_UPDATED: &str = "queue.updated";
/// A queue was deleted.
pub const EVENT_QUEUE_DELETED: &str = "queue.deleted";
/// A queue opened or closed.
pub const EVENT_QUEUE_STATUS: &str = "queue.status";
/// Someone joined, left or moved on.
pub const EVENT_PARTICIPANTS_CHANGED: &str = "participants.changed";
/// Storage degraded or recovered.
pub const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast a queue-level event (`queue.created`, `queue.updated` or `queue.status`).
pub fn broadcast_queue(state: &SharedState, event: &'static str, board: &QueueBoard) {
    let payload = QueueEvent {
        queue: QueueSummary::from(board),
    };
    send_event(state, event, &payload);
}

/// Announce that `queue_id` is gone.
pub fn broadcast_queue_deleted(state: &SharedState, queue_id: QueueId) {
    send_event(state, EVENT_QUEUE_DELETED, &QueueDeletedEvent { queue_id });
}

/// Broadcast the full participant list of a queue after it changed.
pub fn broadcast_participants_changed(state: &SharedState, board: &QueueBoard) {
    let payload = ParticipantsChangedEvent {
        queue_id: board.queue().id,
        participants: board
            .participants()
            .iter()
            .map(ParticipantView::from)
            .collect(),
    };
    send_event(state, EVENT_PARTICIPANTS_CHANGED, &payload);
}

/// Broadcast entering or leaving degraded mode.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event<T: Serialize>(state: &SharedState, event: &'static str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.sse().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialise SSE payload"),
    }
}
