use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{ParticipantEntity, QueueEntity};
use crate::state::queue::{CloseReason, ParticipantStatus, QueueStatus};

/// Queue document; ids are stored as their hyphenated string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQueueDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    description: Option<String>,
    discipline: String,
    scheduled_start: DateTime,
    scheduled_end: DateTime,
    owner_id: String,
    eligible_groups: Vec<String>,
    status: QueueStatus,
    created_at: DateTime,
    closed_at: Option<DateTime>,
    close_reason: Option<CloseReason>,
    #[serde(default)]
    last_position: i64,
    version: i64,
}

/// Participant row in the `participants` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    queue_id: String,
    subject_id: String,
    display_name: String,
    contact: Option<String>,
    position: i64,
    status: ParticipantStatus,
    joined_at: DateTime,
}

impl From<QueueEntity> for MongoQueueDocument {
    fn from(value: QueueEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            description: value.description,
            discipline: value.discipline,
            scheduled_start: DateTime::from_system_time(value.scheduled_start),
            scheduled_end: DateTime::from_system_time(value.scheduled_end),
            owner_id: value.owner_id.to_string(),
            eligible_groups: value.eligible_groups,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            closed_at: value.closed_at.map(DateTime::from_system_time),
            close_reason: value.close_reason,
            last_position: i64::from(value.last_position),
            version: version_value(value.version),
        }
    }
}

impl TryFrom<MongoQueueDocument> for QueueEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQueueDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id("_id", &value.id)?,
            title: value.title,
            description: value.description,
            discipline: value.discipline,
            scheduled_start: value.scheduled_start.to_system_time(),
            scheduled_end: value.scheduled_end.to_system_time(),
            owner_id: parse_id("owner_id", &value.owner_id)?,
            eligible_groups: value.eligible_groups,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            closed_at: value.closed_at.map(|at| at.to_system_time()),
            close_reason: value.close_reason,
            last_position: parse_position(value.last_position)?,
            version: u64::try_from(value.version).map_err(|_| MongoDaoError::Malformed {
                reason: format!("version {} is negative", value.version),
            })?,
        })
    }
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            queue_id: value.queue_id.to_string(),
            subject_id: value.subject_id.to_string(),
            display_name: value.display_name,
            contact: value.contact,
            position: i64::from(value.position),
            status: value.status,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id("_id", &value.id)?,
            queue_id: parse_id("queue_id", &value.queue_id)?,
            subject_id: parse_id("subject_id", &value.subject_id)?,
            display_name: value.display_name,
            contact: value.contact,
            position: parse_position(value.position)?,
            status: value.status,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

fn parse_id(field: &str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Malformed {
        reason: format!("`{field}` is not a UUID ({err})"),
    })
}

fn parse_position(raw: i64) -> MongoResult<u32> {
    u32::try_from(raw).map_err(|_| MongoDaoError::Malformed {
        reason: format!("position {raw} out of range"),
    })
}

/// Version as stored in BSON.
pub fn version_value(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

/// Filter matching a queue only while it is still at `version`.
pub fn versioned_id(id: Uuid, version: u64) -> Document {
    doc! {"_id": id.to_string(), "version": version_value(version)}
}

/// Filter on `_id`.
pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

/// Filter on one participant of one queue.
pub fn participant_key(queue_id: Uuid, participant_id: Uuid) -> Document {
    doc! {"_id": participant_id.to_string(), "queue_id": queue_id.to_string()}
}
