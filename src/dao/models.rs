use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::queue::{CloseReason, ParticipantStatus, QueueStatus};

/// Queue record as stored by every backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntity {
    /// Stable identifier for the queue.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Subject label.
    pub discipline: String,
    /// Inclusive start of the service window.
    pub scheduled_start: SystemTime,
    /// Exclusive end of the service window.
    pub scheduled_end: SystemTime,
    /// Actor that created the queue.
    pub owner_id: Uuid,
    /// Groups allowed to join, sorted.
    pub eligible_groups: Vec<String>,
    /// Scheduling state.
    pub status: QueueStatus,
    /// Creation instant.
    pub created_at: SystemTime,
    /// When the queue was closed, if it was.
    pub closed_at: Option<SystemTime>,
    /// Why the queue was closed, if it was.
    pub close_reason: Option<CloseReason>,
    /// Highest position ever assigned in this queue.
    pub last_position: u32,
    /// Revision counter used for compare-and-set writes.
    pub version: u64,
}

/// Participant record, one per (queue, subject).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Record identifier.
    pub id: Uuid,
    /// Owning queue.
    pub queue_id: Uuid,
    /// Actor behind the record.
    pub subject_id: Uuid,
    /// Name shown to other participants.
    pub display_name: String,
    /// Notification recipient, if any.
    pub contact: Option<String>,
    /// Arrival position, unique per queue.
    pub position: u32,
    /// Standing in the turn order.
    pub status: ParticipantStatus,
    /// Arrival instant.
    pub joined_at: SystemTime,
}

/// Which queues a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueScope {
    /// Every stored queue.
    All,
    /// Queues not yet closed; used by the sweeper.
    Open,
}

/// One participant write inside a [`BoardWrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantWrite {
    /// Create a record.
    Insert(ParticipantEntity),
    /// Change the status of an existing record.
    SetStatus {
        /// Record to update.
        participant_id: Uuid,
        /// New status.
        status: ParticipantStatus,
    },
    /// Delete a record.
    Delete(Uuid),
}

/// Everything one locked step changed in a queue, committed all-or-nothing.
///
/// The store applies it only while the stored queue is still at
/// `expected_version`; otherwise it fails with a conflict and writes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardWrite {
    /// Queue record to store; its `version` is `expected_version + 1`.
    pub queue: QueueEntity,
    /// Version the step was computed from.
    pub expected_version: u64,
    /// Participant writes in the order they were produced.
    pub participants: Vec<ParticipantWrite>,
}
