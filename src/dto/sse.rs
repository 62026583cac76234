use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{participant::ParticipantView, queue::QueueSummary};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends an unnamed event.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event sent to a new subscriber.
pub struct Handshake {
    /// Stream name.
    pub stream: String,
    /// Whether the backend is running without a usable store.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// Whether storage is unavailable.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// `queue.created`, `queue.updated` and `queue.status` payload.
pub struct QueueEvent {
    /// Queue after the change.
    pub queue: QueueSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// `queue.deleted` payload.
pub struct QueueDeletedEvent {
    /// Deleted queue.
    pub queue_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// `participants.changed` payload: the full ordered list after the change.
pub struct ParticipantsChangedEvent {
    /// Queue whose participants changed.
    pub queue_id: Uuid,
    /// Participants in wait order.
    pub participants: Vec<ParticipantView>,
}
