use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::queue::{Participant, ParticipantStatus};

/// Public projection of a participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantView {
    /// Participant record id.
    pub id: Uuid,
    /// Actor behind the record.
    pub subject_id: Uuid,
    /// Name shown in the queue.
    pub display_name: String,
    /// Arrival position; gaps appear when people leave.
    pub position: u32,
    /// Standing in the turn order.
    pub status: ParticipantStatus,
    /// Arrival instant (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

impl From<&Participant> for ParticipantView {
    fn from(value: &Participant) -> Self {
        Self {
            id: value.id,
            subject_id: value.subject_id,
            display_name: value.display_name.clone(),
            position: value.position,
            status: value.status,
            joined_at: value.joined_at,
        }
    }
}

/// Generic acknowledgement for operations without a richer payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Short confirmation text.
    pub message: String,
}

impl ActionResponse {
    /// Acknowledge with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
