//! Scheduling lifecycle of a queue: `upcoming -> active -> closed`.

use thiserror::Error;
use time::OffsetDateTime;

use crate::state::{
    queue::{BoardChange, CloseReason, Queue, QueueBoard, QueueStatus, Transition},
    turns,
};

/// Events that move a queue between scheduling states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The scheduled start has passed.
    Opened,
    /// The scheduled end has passed.
    ScheduleEnded,
    /// Someone closed the queue by hand.
    Closed(CloseReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the queue was in.
    pub from: QueueStatus,
    /// The rejected event.
    pub event: LifecycleEvent,
}

/// Status reached by applying `event` in `from`.
pub fn next_status(
    from: QueueStatus,
    event: LifecycleEvent,
) -> Result<QueueStatus, InvalidTransition> {
    let next = match (from, event) {
        (QueueStatus::Upcoming, LifecycleEvent::Opened) => QueueStatus::Active,
        (QueueStatus::Upcoming | QueueStatus::Active, LifecycleEvent::ScheduleEnded) => {
            QueueStatus::Closed
        }
        (QueueStatus::Upcoming | QueueStatus::Active, LifecycleEvent::Closed(_)) => {
            QueueStatus::Closed
        }
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

/// Event the clock says is due for `queue`, if any.
pub fn due_event(queue: &Queue, now: OffsetDateTime) -> Option<LifecycleEvent> {
    match queue.status {
        QueueStatus::Closed => None,
        _ if queue.window.has_ended(now) => Some(LifecycleEvent::ScheduleEnded),
        QueueStatus::Upcoming if queue.window.has_started(now) => Some(LifecycleEvent::Opened),
        _ => None,
    }
}

/// Whether reconciling `queue` at `now` may change anything. Active queues
/// always qualify since an empty current slot is refilled on reconciliation.
pub fn may_change(queue: &Queue, now: OffsetDateTime) -> bool {
    queue.status == QueueStatus::Active || due_event(queue, now).is_some()
}

/// Bring the board in line with `now`: apply the due lifecycle event, then
/// hand an empty current slot of an active queue to the next waiting
/// participant. Calling it twice with the same instant yields an empty
/// transition the second time.
pub fn reconcile(board: &mut QueueBoard, now: OffsetDateTime) -> Transition {
    let mut transition = match due_event(board.queue(), now) {
        // `due_event` only yields events valid for the current status.
        Some(event) => apply(board, event, now).unwrap_or_default(),
        None => Transition::default(),
    };
    if board.queue().status == QueueStatus::Active {
        transition.merge(turns::promote_next_waiting(board));
    }
    transition
}

/// Close the queue by hand. Fails on an already closed queue.
pub fn close(
    board: &mut QueueBoard,
    reason: CloseReason,
    now: OffsetDateTime,
) -> Result<Transition, InvalidTransition> {
    apply(board, LifecycleEvent::Closed(reason), now)
}

fn apply(
    board: &mut QueueBoard,
    event: LifecycleEvent,
    now: OffsetDateTime,
) -> Result<Transition, InvalidTransition> {
    let next = next_status(board.queue().status, event)?;
    let mut transition = Transition::default();

    match next {
        QueueStatus::Active => {
            board.queue_mut().status = QueueStatus::Active;
            transition.merge(turns::promote_next_waiting(board));
        }
        QueueStatus::Closed => {
            let reason = match event {
                LifecycleEvent::Closed(reason) => reason,
                _ => CloseReason::Schedule,
            };
            transition.merge(turns::finish_current(board));
            let queue = board.queue_mut();
            queue.status = QueueStatus::Closed;
            queue.closed_at = Some(now);
            queue.close_reason = Some(reason);
        }
        QueueStatus::Upcoming => return Err(InvalidTransition { from: next, event }),
    }

    // Participant rows are written before the queue row.
    transition.push_change(BoardChange::Queue);
    Ok(transition)
}
