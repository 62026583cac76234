use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{
        participant::ParticipantView,
        validation::{validate_group_names, validate_not_blank},
    },
    state::queue::{
        CloseReason, ParticipantStatus, QueueBoard, QueueEdit, QueueStatus,
    },
};

const MAX_TITLE_LEN: u64 = 200;
const MAX_DESCRIPTION_LEN: u64 = 2000;

/// Payload used to schedule a new queue.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateQueueRequest {
    /// Display title.
    #[validate(length(min = 1, max = MAX_TITLE_LEN), custom(function = "validate_not_blank"))]
    pub title: String,
    /// Optional free-text description.
    #[serde(default)]
    #[validate(length(max = MAX_DESCRIPTION_LEN))]
    pub description: Option<String>,
    /// Subject the queue is held for.
    #[validate(length(min = 1, max = MAX_TITLE_LEN), custom(function = "validate_not_blank"))]
    pub discipline: String,
    /// Inclusive start of the service window (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    /// Exclusive end of the service window (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    /// Groups whose members may join.
    #[validate(custom(function = "validate_group_names"))]
    pub eligible_groups: Vec<String>,
}

/// Partial update of a queue; omitted fields stay unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateQueueRequest {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// If not specified, does not change it.
    /// If null is specified, removes the description.
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// New discipline.
    #[serde(default)]
    pub discipline: Option<String>,
    /// New start; fixed once the queue is active.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_start: Option<OffsetDateTime>,
    /// New end.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_end: Option<OffsetDateTime>,
    /// Replacement set of eligible groups.
    #[serde(default)]
    pub eligible_groups: Option<Vec<String>>,
}

impl Validate for UpdateQueueRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (field, value) in [("title", &self.title), ("discipline", &self.discipline)] {
            if let Some(value) = value {
                if let Err(err) = validate_not_blank(value) {
                    errors.add(field, err);
                } else if value.chars().count() as u64 > MAX_TITLE_LEN {
                    errors.add(field, too_long(MAX_TITLE_LEN));
                }
            }
        }

        if let Some(Some(description)) = &self.description {
            if description.chars().count() as u64 > MAX_DESCRIPTION_LEN {
                errors.add("description", too_long(MAX_DESCRIPTION_LEN));
            }
        }

        if let Some(groups) = &self.eligible_groups {
            if let Err(err) = validate_group_names(groups) {
                errors.add("eligible_groups", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn too_long(max: u64) -> ValidationError {
    let mut err = ValidationError::new("length");
    err.message = Some(format!("must be at most {max} characters").into());
    err
}

/// Normalise user supplied group names into the stored set.
pub fn group_set(groups: Vec<String>) -> BTreeSet<String> {
    groups
        .into_iter()
        .map(|group| group.trim().to_owned())
        .collect()
}

impl From<UpdateQueueRequest> for QueueEdit {
    fn from(value: UpdateQueueRequest) -> Self {
        Self {
            title: value.title.map(|title| title.trim().to_owned()),
            description: value.description,
            discipline: value.discipline.map(|discipline| discipline.trim().to_owned()),
            scheduled_start: value.scheduled_start,
            scheduled_end: value.scheduled_end,
            eligible_groups: value.eligible_groups.map(group_set),
        }
    }
}

/// Status filter accepted by the listing route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Any status.
    #[default]
    All,
    /// Not open yet.
    Upcoming,
    /// Open now.
    Active,
    /// Closed.
    Closed,
}

impl StatusFilter {
    /// Whether `status` passes the filter.
    pub fn matches(self, status: QueueStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Upcoming => status == QueueStatus::Upcoming,
            StatusFilter::Active => status == QueueStatus::Active,
            StatusFilter::Closed => status == QueueStatus::Closed,
        }
    }
}

/// Query parameters of `GET /queues`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQueuesQuery {
    /// `all` (default), `upcoming`, `active` or `closed`.
    #[serde(default)]
    #[param(value_type = Option<String>)]
    pub status: StatusFilter,
    /// Exact discipline, case-insensitive.
    pub discipline: Option<String>,
    /// Case-insensitive substring of title, discipline or a group name.
    pub search: Option<String>,
}

/// Queue as shown in listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueSummary {
    /// Queue id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Subject label.
    pub discipline: String,
    /// Opening instant (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    /// Closing instant (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    /// Actor that created the queue.
    pub owner_id: Uuid,
    /// Groups allowed to join.
    pub eligible_groups: Vec<String>,
    /// Scheduling state.
    pub status: QueueStatus,
    /// Creation instant.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the queue closed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    /// Why the queue closed, if it did.
    pub close_reason: Option<CloseReason>,
    /// Participants still waiting for their turn.
    pub waiting: usize,
    /// Holder of the current slot.
    pub current: Option<ParticipantView>,
}

impl From<&QueueBoard> for QueueSummary {
    fn from(board: &QueueBoard) -> Self {
        let queue = board.queue();
        Self {
            id: queue.id,
            title: queue.title.clone(),
            description: queue.description.clone(),
            discipline: queue.discipline.clone(),
            scheduled_start: queue.window.start(),
            scheduled_end: queue.window.end(),
            owner_id: queue.owner_id,
            eligible_groups: queue.eligible_groups.iter().cloned().collect(),
            status: queue.status,
            created_at: queue.created_at,
            closed_at: queue.closed_at,
            close_reason: queue.close_reason,
            waiting: board
                .participants()
                .iter()
                .filter(|participant| participant.status == ParticipantStatus::Waiting)
                .count(),
            current: board.current().map(ParticipantView::from),
        }
    }
}

/// Queue with its full participant list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueDetail {
    /// Queue attributes.
    pub queue: QueueSummary,
    /// Participants in wait order.
    pub participants: Vec<ParticipantView>,
}

impl From<&QueueBoard> for QueueDetail {
    fn from(board: &QueueBoard) -> Self {
        Self {
            queue: QueueSummary::from(board),
            participants: board
                .participants()
                .iter()
                .map(ParticipantView::from)
                .collect(),
        }
    }
}
