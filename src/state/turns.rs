//! Turn-taking over a single current slot.
//!
//! Every operation works on a [`QueueBoard`] already reconciled against the
//! clock and returns the changes the caller has to persist. Nothing here
//! touches storage or sends messages.

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{
    actor::Actor,
    queue::{
        BoardChange, Notice, Participant, ParticipantId, ParticipantStatus, QueueBoard,
        QueueStatus, Transition,
    },
};

/// Rejections of turn operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The queue no longer accepts changes.
    #[error("queue is closed")]
    QueueClosed,
    /// The actor belongs to no eligible group.
    #[error("none of the actor's groups may join this queue")]
    Ineligible,
    /// The actor already has an unfinished place.
    #[error("actor already has a place in this queue")]
    AlreadyJoined,
    /// The actor has no place to leave or complete.
    #[error("actor is not in this queue")]
    NotInQueue,
    /// Only the current participant may complete.
    #[error("actor does not hold the current turn")]
    NotCurrentTurn,
}

/// Admit `actor` at the end of the queue.
///
/// The very first arrival on an already active queue takes the current slot
/// directly; everyone else waits.
pub fn join(
    board: &mut QueueBoard,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<(ParticipantId, Transition), TurnError> {
    let queue = board.queue();
    if queue.is_closed() {
        return Err(TurnError::QueueClosed);
    }
    if !actor.is_eligible_for(queue) {
        return Err(TurnError::Ineligible);
    }
    if board.find_subject(actor.id).is_some() {
        return Err(TurnError::AlreadyJoined);
    }

    let first_ever = queue.last_position == 0 && board.participants().is_empty();
    let status = if first_ever && queue.status == QueueStatus::Active && board.current().is_none()
    {
        ParticipantStatus::Current
    } else {
        ParticipantStatus::Waiting
    };

    let participant = Participant {
        id: Uuid::new_v4(),
        queue_id: queue.id,
        subject_id: actor.id,
        display_name: actor
            .display_name
            .clone()
            .unwrap_or_else(|| actor.id.to_string()),
        contact: actor.contact.clone(),
        position: board.highest_position() + 1,
        status,
        joined_at: now,
    };
    let id = participant.id;

    let mut transition = Transition::default();
    if status == ParticipantStatus::Current {
        transition.push_notice(Notice::turn_started(board.queue(), &participant));
    }
    board.push(participant);
    transition.push_change(BoardChange::Joined(id));
    transition.push_change(BoardChange::Queue);

    Ok((id, transition))
}

/// Remove the actor's record. A vacated current slot is not refilled here;
/// the next reconciliation hands it on.
pub fn leave(board: &mut QueueBoard, actor: &Actor) -> Result<(Participant, Transition), TurnError> {
    let id = board
        .find_subject(actor.id)
        .map(|participant| participant.id)
        .ok_or(TurnError::NotInQueue)?;
    let removed = board.remove(id).ok_or(TurnError::NotInQueue)?;

    let mut transition = Transition::default();
    transition.push_change(BoardChange::Left(id));
    Ok((removed, transition))
}

/// Finish the actor's turn and hand the slot to the next waiting participant.
pub fn complete(board: &mut QueueBoard, actor: &Actor) -> Result<Transition, TurnError> {
    if board.queue().is_closed() {
        return Err(TurnError::QueueClosed);
    }
    let id = match board.find_subject(actor.id) {
        Some(participant) if participant.status == ParticipantStatus::Current => participant.id,
        _ => return Err(TurnError::NotCurrentTurn),
    };

    let mut transition = Transition::default();
    board.set_status(id, ParticipantStatus::Done);
    transition.push_change(BoardChange::Status {
        participant_id: id,
        status: ParticipantStatus::Done,
    });
    transition.merge(promote_next_waiting(board));
    Ok(transition)
}

/// Participants in wait order.
pub fn list_participants(board: &QueueBoard) -> &[Participant] {
    board.participants()
}

/// Give the current slot to the lowest-positioned waiting participant unless
/// someone already holds it.
pub(crate) fn promote_next_waiting(board: &mut QueueBoard) -> Transition {
    let mut transition = Transition::default();
    if board.current().is_some() {
        return transition;
    }
    let Some(next) = board.next_waiting().cloned() else {
        return transition;
    };

    board.set_status(next.id, ParticipantStatus::Current);
    transition.push_change(BoardChange::Status {
        participant_id: next.id,
        status: ParticipantStatus::Current,
    });
    transition.push_notice(Notice::turn_started(board.queue(), &next));
    transition
}

/// Mark whoever holds the current slot as done.
pub(crate) fn finish_current(board: &mut QueueBoard) -> Transition {
    let mut transition = Transition::default();
    let Some(id) = board.current().map(|participant| participant.id) else {
        return transition;
    };
    board.set_status(id, ParticipantStatus::Done);
    transition.push_change(BoardChange::Status {
        participant_id: id,
        status: ParticipantStatus::Done,
    });
    transition
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use proptest::prelude::*;
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::state::{
        actor::Role,
        lifecycle,
        queue::{NewQueue, Queue, ScheduleWindow},
    };

    const START: OffsetDateTime = datetime!(2025-03-01 10:00 UTC);

    fn board(status: QueueStatus) -> QueueBoard {
        let window = ScheduleWindow::new(START, START + Duration::hours(1)).unwrap();
        let mut queue = Queue::new(
            NewQueue {
                title: "Lab 3 defence".into(),
                description: None,
                discipline: "Operating systems".into(),
                window,
                eligible_groups: BTreeSet::from(["IU7-51".to_string()]),
            },
            Uuid::new_v4(),
            START - Duration::hours(1),
        );
        queue.status = status;
        QueueBoard::new(queue, Vec::new())
    }

    fn student(name: &str) -> Actor {
        Actor::new(Uuid::new_v4(), Role::Student, ["IU7-51"])
            .with_display_name(name)
            .with_contact(format!("chat-{name}"))
    }

    fn statuses(board: &QueueBoard) -> Vec<(String, ParticipantStatus)> {
        board
            .participants()
            .iter()
            .map(|participant| (participant.display_name.clone(), participant.status))
            .collect()
    }

    #[test]
    fn first_joiner_on_active_queue_takes_the_slot() {
        let mut board = board(QueueStatus::Active);
        let alice = student("alice");
        let bob = student("bob");

        let (_, transition) = join(&mut board, &alice, START).unwrap();
        assert_eq!(transition.notices.len(), 1);
        assert_eq!(transition.notices[0].recipient.as_deref(), Some("chat-alice"));

        let (_, transition) = join(&mut board, &bob, START).unwrap();
        assert!(transition.notices.is_empty());
        assert_eq!(
            statuses(&board),
            vec![
                ("alice".into(), ParticipantStatus::Current),
                ("bob".into(), ParticipantStatus::Waiting),
            ]
        );
    }

    #[test]
    fn joining_an_upcoming_queue_always_waits() {
        let mut board = board(QueueStatus::Upcoming);
        let (_, transition) = join(&mut board, &student("alice"), START).unwrap();
        assert!(transition.notices.is_empty());
        assert_eq!(board.participants()[0].status, ParticipantStatus::Waiting);
        assert_eq!(board.participants()[0].position, 1);
    }

    #[test]
    fn join_checks_closed_then_eligibility_then_duplicates() {
        let mut closed = board(QueueStatus::Closed);
        let outsider = Actor::new(Uuid::new_v4(), Role::Student, ["IU8-11"]);
        assert_eq!(
            join(&mut closed, &outsider, START).unwrap_err(),
            TurnError::QueueClosed
        );

        let mut open = board(QueueStatus::Active);
        assert_eq!(
            join(&mut open, &outsider, START).unwrap_err(),
            TurnError::Ineligible
        );

        let admin = Actor::new(Uuid::new_v4(), Role::Admin, Vec::<String>::new());
        assert_eq!(join(&mut open, &admin, START).unwrap_err(), TurnError::Ineligible);

        let alice = student("alice");
        join(&mut open, &alice, START).unwrap();
        assert_eq!(
            join(&mut open, &alice, START).unwrap_err(),
            TurnError::AlreadyJoined
        );
    }

    #[test]
    fn leave_keeps_slot_empty_and_positions_unique() {
        let mut board = board(QueueStatus::Active);
        let alice = student("alice");
        let bob = student("bob");
        join(&mut board, &alice, START).unwrap();
        join(&mut board, &bob, START).unwrap();

        let (removed, transition) = leave(&mut board, &alice).unwrap();
        assert_eq!(removed.display_name, "alice");
        assert_eq!(transition.changes, vec![BoardChange::Left(removed.id)]);
        assert!(board.current().is_none());
        assert_eq!(leave(&mut board, &alice).unwrap_err(), TurnError::NotInQueue);

        let (_, _) = leave(&mut board, &bob).unwrap();
        join(&mut board, &alice, START).unwrap();
        assert_eq!(board.participants()[0].position, 3);
        assert_eq!(board.participants()[0].status, ParticipantStatus::Waiting);
    }

    #[test]
    fn complete_hands_the_slot_over_in_order() {
        let mut board = board(QueueStatus::Active);
        let alice = student("alice");
        let bob = student("bob");
        let carol = student("carol");
        for actor in [&alice, &bob, &carol] {
            join(&mut board, actor, START).unwrap();
        }

        assert_eq!(complete(&mut board, &bob).unwrap_err(), TurnError::NotCurrentTurn);

        let transition = complete(&mut board, &alice).unwrap();
        assert_eq!(transition.notices.len(), 1);
        assert_eq!(transition.notices[0].recipient.as_deref(), Some("chat-bob"));
        assert!(matches!(
            transition.changes.as_slice(),
            [
                BoardChange::Status { status: ParticipantStatus::Done, .. },
                BoardChange::Status { status: ParticipantStatus::Current, .. },
            ]
        ));

        complete(&mut board, &bob).unwrap();
        let transition = complete(&mut board, &carol).unwrap();
        assert!(transition.notices.is_empty());
        assert!(board.current().is_none());
        assert_eq!(complete(&mut board, &carol).unwrap_err(), TurnError::NotCurrentTurn);
    }

    #[test]
    fn complete_on_closed_or_upcoming_queue_is_rejected() {
        let mut closed = board(QueueStatus::Closed);
        assert_eq!(
            complete(&mut closed, &student("alice")).unwrap_err(),
            TurnError::QueueClosed
        );

        let mut upcoming = board(QueueStatus::Upcoming);
        let alice = student("alice");
        join(&mut upcoming, &alice, START).unwrap();
        assert_eq!(
            complete(&mut upcoming, &alice).unwrap_err(),
            TurnError::NotCurrentTurn
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join(usize),
        Leave(usize),
        Complete(usize),
        Tick(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..6).prop_map(Op::Join),
            (0usize..6).prop_map(Op::Leave),
            (0usize..6).prop_map(Op::Complete),
            (0i64..30).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn slot_and_positions_hold_under_any_sequence(ops in prop::collection::vec(op(), 1..60)) {
            let actors: Vec<Actor> = (0..6).map(|n| student(&format!("s{n}"))).collect();
            let mut board = board(QueueStatus::Upcoming);
            let mut now = START - Duration::minutes(20);
            let mut handed_out = HashSet::new();

            for op in ops {
                lifecycle::reconcile(&mut board, now);
                if board.queue().status == QueueStatus::Active && board.next_waiting().is_some() {
                    prop_assert!(board.current().is_some(), "reconciled active queue left its slot empty");
                }
                match op {
                    Op::Join(n) => {
                        if let Ok((id, _)) = join(&mut board, &actors[n], now) {
                            let position = board.participant(id).unwrap().position;
                            prop_assert!(handed_out.insert(position), "position {} reused", position);
                        }
                    }
                    Op::Leave(n) => {
                        let _ = leave(&mut board, &actors[n]);
                    }
                    Op::Complete(n) => {
                        let _ = complete(&mut board, &actors[n]);
                    }
                    Op::Tick(minutes) => now += Duration::minutes(minutes),
                }

                let current = board
                    .participants()
                    .iter()
                    .filter(|participant| participant.status == ParticipantStatus::Current)
                    .count();
                prop_assert!(current <= 1);
                prop_assert!(
                    board
                        .participants()
                        .windows(2)
                        .all(|pair| pair[0].position < pair[1].position)
                );
                if board.queue().status != QueueStatus::Active {
                    prop_assert_eq!(current, 0);
                }
            }
        }
    }
}
