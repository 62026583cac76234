use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::queue::Queue;

/// Identifier of an authenticated person, as issued by the identity gateway.
pub type ActorId = Uuid;

/// Coarse role attached to every authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular participant.
    Student,
    /// Staff member who usually owns queues.
    Teacher,
    /// Operator allowed to edit, delete and force-close any queue.
    Admin,
}

impl Role {
    /// Parse the header representation (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Already-authenticated caller of a queue operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Stable identity of the caller.
    pub id: ActorId,
    /// Role granted by the identity collaborator.
    pub role: Role,
    /// Group memberships at the time of the request.
    pub groups: BTreeSet<String>,
    /// Name shown in participant listings.
    pub display_name: Option<String>,
    /// External recipient id used for notifications (e.g. a Telegram chat id).
    pub contact: Option<String>,
}

impl Actor {
    /// Build an actor with no display name or contact.
    pub fn new<I, S>(id: ActorId, role: Role, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            role,
            groups: groups.into_iter().map(Into::into).collect(),
            display_name: None,
            contact: None,
        }
    }

    /// Attach a display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Attach a notification contact.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Whether the actor holds the administrator role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the actor created `queue`.
    pub fn owns(&self, queue: &Queue) -> bool {
        queue.owner_id == self.id
    }

    /// Owners and admins may edit or delete a queue.
    pub fn can_manage(&self, queue: &Queue) -> bool {
        self.is_admin() || self.owns(queue)
    }

    /// Whether any of the actor's groups is eligible for `queue`.
    pub fn is_eligible_for(&self, queue: &Queue) -> bool {
        !self.groups.is_disjoint(&queue.eligible_groups)
    }

    /// Whether the queue shows up in this actor's listings.
    pub fn can_see(&self, queue: &Queue) -> bool {
        self.is_admin() || self.owns(queue) || self.is_eligible_for(queue)
    }
}
