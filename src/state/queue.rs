use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ParticipantEntity, QueueEntity},
    state::actor::ActorId,
};

/// Identifier of a queue.
pub type QueueId = Uuid;
/// Identifier of a participant record (not of the person behind it).
pub type ParticipantId = Uuid;

/// Scheduling state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// The window has not started yet; participants may already join.
    Upcoming,
    /// Inside the window; the current slot is being served.
    Active,
    /// Terminal state.
    Closed,
}

impl QueueStatus {
    /// Wire and storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Upcoming => "upcoming",
            QueueStatus::Active => "active",
            QueueStatus::Closed => "closed",
        }
    }
}

/// Why a queue ended up closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The scheduled end passed.
    Schedule,
    /// The owner closed it by hand.
    Owner,
    /// An administrator forced it closed.
    Admin,
}

/// Standing of a participant in the turn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Queued behind the current participant.
    Waiting,
    /// Being served.
    Current,
    /// Served or skipped.
    Done,
}

impl ParticipantStatus {
    /// Stored and logged form.
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Waiting => "waiting",
            ParticipantStatus::Current => "current",
            ParticipantStatus::Done => "done",
        }
    }
}

/// Half-open time window `[start, end)` during which a queue is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

/// Rejected schedule windows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The end is not after the start.
    #[error("scheduled end {end} must be after scheduled start {start}")]
    EndNotAfterStart {
        /// Requested start.
        start: OffsetDateTime,
        /// Requested end.
        end: OffsetDateTime,
    },
    /// The start lies beyond the allowed lead time.
    #[error("a queue cannot open more than {lead} ahead of time")]
    TooFarAhead { lead: Duration },
    /// The end is already in the past.
    #[error("the scheduled window has already ended")]
    AlreadyEnded,
}

impl ScheduleWindow {
    /// Build a window, requiring `start < end`.
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// First served instant.
    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Instant the queue closes.
    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// Check that a freshly scheduled window opens within `max_lead` of `now`
    /// and has not already ended.
    pub fn check_schedulable(
        &self,
        now: OffsetDateTime,
        max_lead: Duration,
    ) -> Result<(), WindowError> {
        if self.start - now > max_lead {
            return Err(WindowError::TooFarAhead { lead: max_lead });
        }
        if self.end <= now {
            return Err(WindowError::AlreadyEnded);
        }
        Ok(())
    }

    /// `now >= start`.
    pub fn has_started(&self, now: OffsetDateTime) -> bool {
        now >= self.start
    }

    /// `now >= end`.
    pub fn has_ended(&self, now: OffsetDateTime) -> bool {
        now >= self.end
    }
}

/// A scheduled, time-windowed turn-taking session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    /// Queue id.
    pub id: QueueId,
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Subject the queue is held for (free-text label).
    pub discipline: String,
    /// When the queue is served.
    pub window: ScheduleWindow,
    /// Creator; may edit and delete.
    pub owner_id: ActorId,
    /// Groups whose members may join; never empty.
    pub eligible_groups: BTreeSet<String>,
    /// Lifecycle status.
    pub status: QueueStatus,
    /// Creation instant.
    pub created_at: OffsetDateTime,
    /// Set once, when the queue closes.
    pub closed_at: Option<OffsetDateTime>,
    /// Set together with `closed_at`.
    pub close_reason: Option<CloseReason>,
    /// Highest position ever handed out; never decreases.
    pub last_position: u32,
    /// Storage revision this value was loaded at; bumped on every commit.
    pub version: u64,
}

/// Everything needed to create a queue, already validated for shape.
#[derive(Debug, Clone)]
pub struct NewQueue {
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Subject label.
    pub discipline: String,
    /// Requested window.
    pub window: ScheduleWindow,
    /// Groups allowed to join.
    pub eligible_groups: BTreeSet<String>,
}

impl Queue {
    /// Create a queue owned by `owner_id`. It always starts `upcoming`; the
    /// first reconciliation moves it to wherever the clock says it belongs.
    pub fn new(new: NewQueue, owner_id: ActorId, created_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            discipline: new.discipline,
            window: new.window,
            owner_id,
            eligible_groups: new.eligible_groups,
            status: QueueStatus::Upcoming,
            created_at,
            closed_at: None,
            close_reason: None,
            last_position: 0,
            version: 0,
        }
    }

    /// Whether the queue reached its terminal status.
    pub fn is_closed(&self) -> bool {
        self.status == QueueStatus::Closed
    }

    /// Apply an owner/admin edit. Window changes are refused once the queue is
    /// closed, the start is fixed once the queue is active, and a moved start
    /// must open within `max_lead` of `now`.
    pub fn apply_edit(
        &mut self,
        edit: QueueEdit,
        now: OffsetDateTime,
        max_lead: Duration,
    ) -> Result<(), EditError> {
        let touches_window = edit.scheduled_start.is_some() || edit.scheduled_end.is_some();
        if touches_window && self.is_closed() {
            return Err(EditError::WindowLocked);
        }
        if self.status == QueueStatus::Active
            && edit
                .scheduled_start
                .is_some_and(|start| start != self.window.start)
        {
            return Err(EditError::StartLocked);
        }
        if matches!(&edit.eligible_groups, Some(groups) if groups.is_empty()) {
            return Err(EditError::NoEligibleGroups);
        }

        let window = if touches_window {
            let start = edit.scheduled_start.unwrap_or(self.window.start);
            let end = edit.scheduled_end.unwrap_or(self.window.end);
            let window = ScheduleWindow::new(start, end)?;
            if edit.scheduled_start.is_some() && window.start - now > max_lead {
                return Err(WindowError::TooFarAhead { lead: max_lead }.into());
            }
            Some(window)
        } else {
            None
        };

        if let Some(title) = edit.title {
            self.title = title;
        }
        if let Some(description) = edit.description {
            self.description = description;
        }
        if let Some(discipline) = edit.discipline {
            self.discipline = discipline;
        }
        if let Some(groups) = edit.eligible_groups {
            self.eligible_groups = groups;
        }
        if let Some(window) = window {
            self.window = window;
        }
        Ok(())
    }
}

/// Explicit set of editable queue attributes; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEdit {
    /// New title.
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    /// New discipline.
    pub discipline: Option<String>,
    /// New start.
    pub scheduled_start: Option<OffsetDateTime>,
    /// New end.
    pub scheduled_end: Option<OffsetDateTime>,
    /// Replacement group set.
    pub eligible_groups: Option<BTreeSet<String>>,
}

impl QueueEdit {
    /// Whether the edit moves either end of the schedule.
    pub fn touches_window(&self) -> bool {
        self.scheduled_start.is_some() || self.scheduled_end.is_some()
    }
}

/// Rejected queue edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The resulting window is invalid.
    #[error(transparent)]
    Window(#[from] WindowError),
    /// The queue is closed.
    #[error("the schedule of a closed queue cannot change")]
    WindowLocked,
    /// The queue is active; only its end may move.
    #[error("the start of an active queue cannot change")]
    StartLocked,
    /// The edit would leave no eligible group.
    #[error("a queue needs at least one eligible group")]
    NoEligibleGroups,
}

/// One actor's standing within a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Record id.
    pub id: ParticipantId,
    /// Owning queue.
    pub queue_id: QueueId,
    /// Actor holding the place.
    pub subject_id: ActorId,
    /// Name shown to others.
    pub display_name: String,
    /// Recipient handed to the notifier, if the actor has one.
    pub contact: Option<String>,
    /// Arrival order; unique within the queue and never reused.
    pub position: u32,
    /// Standing in the turn order.
    pub status: ParticipantStatus,
    /// Arrival instant.
    pub joined_at: OffsetDateTime,
}

/// A queue together with its participants ordered by position; the unit both
/// state machines operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBoard {
    queue: Queue,
    participants: Vec<Participant>,
}

impl QueueBoard {
    /// Pair a queue with its participants, sorting them by position.
    pub fn new(queue: Queue, mut participants: Vec<Participant>) -> Self {
        participants.sort_by_key(|participant| participant.position);
        Self {
            queue,
            participants,
        }
    }

    /// The queue record.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut Queue {
        &mut self.queue
    }

    /// Participants in wait order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Look up a participant by record id.
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|participant| participant.id == id)
    }

    /// Look up the participant belonging to an actor.
    pub fn find_subject(&self, subject_id: ActorId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|participant| participant.subject_id == subject_id)
    }

    /// Holder of the current slot.
    pub fn current(&self) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|participant| participant.status == ParticipantStatus::Current)
    }

    /// Lowest-positioned participant still waiting.
    pub fn next_waiting(&self) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|participant| participant.status == ParticipantStatus::Waiting)
    }

    /// Highest position ever assigned, including records that have since left.
    pub fn highest_position(&self) -> u32 {
        let live = self
            .participants
            .last()
            .map(|participant| participant.position)
            .unwrap_or(0);
        self.queue.last_position.max(live)
    }

    pub(crate) fn set_status(&mut self, id: ParticipantId, status: ParticipantStatus) -> bool {
        match self.participants.iter_mut().find(|participant| participant.id == id) {
            Some(participant) => {
                participant.status = status;
                true
            }
            None => false,
        }
    }

    pub(crate) fn push(&mut self, participant: Participant) {
        self.queue.last_position = self.queue.last_position.max(participant.position);
        self.participants.push(participant);
        self.participants.sort_by_key(|participant| participant.position);
    }

    pub(crate) fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|participant| participant.id == id)?;
        Some(self.participants.remove(index))
    }

    /// Split back into the queue and its participants.
    pub fn into_parts(self) -> (Queue, Vec<Participant>) {
        (self.queue, self.participants)
    }
}

/// Persistable effect of a state-machine step, in the order it must be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardChange {
    /// The queue record itself changed (status, close metadata, counters).
    Queue,
    /// A participant record was created.
    Joined(ParticipantId),
    /// A participant's status changed.
    Status {
        participant_id: ParticipantId,
        status: ParticipantStatus,
    },
    /// A participant record was deleted.
    Left(ParticipantId),
}

/// What a notice tells its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The recipient now holds the current slot.
    TurnStarted,
}

/// Outbound message produced by a transition, sent once it has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Queue the notice is about.
    pub queue_id: QueueId,
    /// Title quoted in the message.
    pub queue_title: String,
    /// Participant concerned.
    pub participant_id: ParticipantId,
    /// Actor concerned.
    pub subject_id: ActorId,
    /// Notifier address; nothing is sent without one.
    pub recipient: Option<String>,
    /// What happened.
    pub kind: NoticeKind,
}

impl Notice {
    pub(crate) fn turn_started(queue: &Queue, participant: &Participant) -> Self {
        Self {
            queue_id: queue.id,
            queue_title: queue.title.clone(),
            participant_id: participant.id,
            subject_id: participant.subject_id,
            recipient: participant.contact.clone(),
            kind: NoticeKind::TurnStarted,
        }
    }
}

/// Changes and notices produced by one state-machine step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Writes to persist, in order.
    pub changes: Vec<BoardChange>,
    /// Messages to send after the commit.
    pub notices: Vec<Notice>,
}

impl Transition {
    /// Nothing changed and nobody is notified.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.notices.is_empty()
    }

    /// Append `other` after this step.
    pub fn merge(&mut self, other: Transition) {
        self.changes.extend(other.changes);
        self.notices.extend(other.notices);
    }

    pub(crate) fn push_change(&mut self, change: BoardChange) {
        self.changes.push(change);
    }

    pub(crate) fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

impl From<QueueEntity> for Queue {
    fn from(value: QueueEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            discipline: value.discipline,
            // Entities are only written from validated queues.
            window: ScheduleWindow {
                start: value.scheduled_start.into(),
                end: value.scheduled_end.into(),
            },
            owner_id: value.owner_id,
            eligible_groups: value.eligible_groups.into_iter().collect(),
            status: value.status,
            created_at: value.created_at.into(),
            closed_at: value.closed_at.map(Into::into),
            close_reason: value.close_reason,
            last_position: value.last_position,
            version: value.version,
        }
    }
}

impl From<Queue> for QueueEntity {
    fn from(value: Queue) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            discipline: value.discipline,
            scheduled_start: value.window.start.into(),
            scheduled_end: value.window.end.into(),
            owner_id: value.owner_id,
            eligible_groups: value.eligible_groups.into_iter().collect(),
            status: value.status,
            created_at: value.created_at.into(),
            closed_at: value.closed_at.map(Into::into),
            close_reason: value.close_reason,
            last_position: value.last_position,
            version: value.version,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            queue_id: value.queue_id,
            subject_id: value.subject_id,
            display_name: value.display_name,
            contact: value.contact,
            position: value.position,
            status: value.status,
            joined_at: value.joined_at.into(),
        }
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            id: value.id,
            queue_id: value.queue_id,
            subject_id: value.subject_id,
            display_name: value.display_name,
            contact: value.contact,
            position: value.position,
            status: value.status,
            joined_at: value.joined_at.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample_queue() -> Queue {
        let window = ScheduleWindow::new(
            datetime!(2025-03-01 10:00 UTC),
            datetime!(2025-03-01 11:00 UTC),
        )
        .unwrap();
        Queue::new(
            NewQueue {
                title: "Lab 3 defence".into(),
                description: None,
                discipline: "Operating systems".into(),
                window,
                eligible_groups: BTreeSet::from(["IU7-51".to_string()]),
            },
            Uuid::new_v4(),
            datetime!(2025-03-01 09:00 UTC),
        )
    }

    #[test]
    fn window_requires_end_after_start() {
        let start = datetime!(2025-03-01 10:00 UTC);
        assert!(matches!(
            ScheduleWindow::new(start, start),
            Err(WindowError::EndNotAfterStart { .. })
        ));
        assert!(ScheduleWindow::new(start, start + Duration::minutes(1)).is_ok());
    }

    #[test]
    fn window_must_open_within_lead() {
        let now = datetime!(2025-03-01 08:00 UTC);
        let window = ScheduleWindow::new(
            now + Duration::hours(25),
            now + Duration::hours(26),
        )
        .unwrap();
        assert_eq!(
            window.check_schedulable(now, Duration::days(1)),
            Err(WindowError::TooFarAhead {
                lead: Duration::days(1)
            })
        );

        let ended =
            ScheduleWindow::new(now - Duration::hours(2), now - Duration::hours(1)).unwrap();
        assert_eq!(
            ended.check_schedulable(now, Duration::days(1)),
            Err(WindowError::AlreadyEnded)
        );

        let started_earlier = ScheduleWindow::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        assert!(started_earlier.check_schedulable(now, Duration::days(1)).is_ok());
    }

    #[test]
    fn new_queue_starts_upcoming_with_no_positions() {
        let queue = sample_queue();
        assert_eq!(queue.status, QueueStatus::Upcoming);
        assert_eq!(queue.last_position, 0);
        assert!(queue.closed_at.is_none());
    }

    #[test]
    fn edit_updates_only_named_fields() {
        let mut queue = sample_queue();
        let now = datetime!(2025-03-01 09:30 UTC);
        queue
            .apply_edit(
                QueueEdit {
                    description: Some(Some("bring your report".into())),
                    scheduled_end: Some(datetime!(2025-03-01 12:00 UTC)),
                    ..QueueEdit::default()
                },
                now,
                Duration::days(1),
            )
            .unwrap();

        assert_eq!(queue.title, "Lab 3 defence");
        assert_eq!(queue.description.as_deref(), Some("bring your report"));
        assert_eq!(queue.window.end(), datetime!(2025-03-01 12:00 UTC));

        queue
            .apply_edit(
                QueueEdit {
                    description: Some(None),
                    ..QueueEdit::default()
                },
                now,
                Duration::days(1),
            )
            .unwrap();
        assert!(queue.description.is_none());
    }

    #[test]
    fn edit_rejects_inverted_window_without_touching_queue() {
        let mut queue = sample_queue();
        let before = queue.clone();
        let err = queue
            .apply_edit(
                QueueEdit {
                    title: Some("renamed".into()),
                    scheduled_end: Some(datetime!(2025-03-01 09:00 UTC)),
                    ..QueueEdit::default()
                },
                datetime!(2025-03-01 09:30 UTC),
                Duration::days(1),
            )
            .unwrap_err();

        assert!(matches!(err, EditError::Window(WindowError::EndNotAfterStart { .. })));
        assert_eq!(queue, before);
    }

    #[test]
    fn closed_queue_schedule_is_locked() {
        let mut queue = sample_queue();
        queue.status = QueueStatus::Closed;
        let err = queue
            .apply_edit(
                QueueEdit {
                    scheduled_start: Some(datetime!(2025-03-01 10:30 UTC)),
                    ..QueueEdit::default()
                },
                datetime!(2025-03-01 09:30 UTC),
                Duration::days(1),
            )
            .unwrap_err();
        assert_eq!(err, EditError::WindowLocked);

        queue
            .apply_edit(
                QueueEdit {
                    title: Some("Lab 3 defence (archived)".into()),
                    ..QueueEdit::default()
                },
                datetime!(2025-03-01 09:30 UTC),
                Duration::days(1),
            )
            .unwrap();
        assert_eq!(queue.title, "Lab 3 defence (archived)");
    }

    #[test]
    fn active_queue_start_is_locked_but_end_may_move() {
        let mut queue = sample_queue();
        queue.status = QueueStatus::Active;
        let now = datetime!(2025-03-01 10:10 UTC);

        let err = queue
            .apply_edit(
                QueueEdit {
                    scheduled_start: Some(datetime!(2025-03-01 10:40 UTC)),
                    ..QueueEdit::default()
                },
                now,
                Duration::days(1),
            )
            .unwrap_err();
        assert_eq!(err, EditError::StartLocked);
        assert_eq!(queue.window.start(), datetime!(2025-03-01 10:00 UTC));

        queue
            .apply_edit(
                QueueEdit {
                    scheduled_start: Some(datetime!(2025-03-01 10:00 UTC)),
                    scheduled_end: Some(datetime!(2025-03-01 11:30 UTC)),
                    ..QueueEdit::default()
                },
                now,
                Duration::days(1),
            )
            .unwrap();
        assert_eq!(queue.window.end(), datetime!(2025-03-01 11:30 UTC));
    }

    #[test]
    fn board_keeps_position_order_and_counter() {
        let queue = sample_queue();
        let queue_id = queue.id;
        let make = |position: u32| Participant {
            id: Uuid::new_v4(),
            queue_id,
            subject_id: Uuid::new_v4(),
            display_name: format!("student {position}"),
            contact: None,
            position,
            status: ParticipantStatus::Waiting,
            joined_at: datetime!(2025-03-01 09:10 UTC),
        };

        let mut board = QueueBoard::new(queue, vec![make(4), make(2)]);
        assert_eq!(
            board
                .participants()
                .iter()
                .map(|participant| participant.position)
                .collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(board.highest_position(), 4);

        let last = board.participants()[1].id;
        board.remove(last);
        board.queue_mut().last_position = 4;
        assert_eq!(board.highest_position(), 4);
    }
}
