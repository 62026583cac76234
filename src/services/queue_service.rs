//! Orchestration of queue operations.
//!
//! Every mutation follows the same sequence: take the queue's lock, load its
//! board, reconcile it with the clock, run the operation, commit the changes
//! as one versioned write, release the lock, and only then hand notices to the
//! notification port and events to the SSE hub. The lock serializes callers in
//! this process; the version check serializes processes sharing a database,
//! and a lost race is retried from a fresh load.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{BoardWrite, ParticipantWrite, QueueEntity, QueueScope},
        queue_store::QueueStore,
        storage::StorageError,
    },
    dto::{
        participant::{ActionResponse, ParticipantView},
        queue::{
            CreateQueueRequest, ListQueuesQuery, QueueDetail, QueueSummary, UpdateQueueRequest,
            group_set,
        },
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        actor::Actor,
        lifecycle,
        queue::{
            BoardChange, CloseReason, NewQueue, Queue, QueueBoard, QueueEdit, QueueId,
            QueueStatus, ScheduleWindow, Transition,
        },
        turns,
    },
};

/// Board state after a locked step, kept until the lock is released.
struct Committed<T> {
    outcome: Result<T, ServiceError>,
    board: QueueBoard,
    transition: Transition,
    status_before: QueueStatus,
}

async fn load_board(
    store: &Arc<dyn QueueStore>,
    queue_id: QueueId,
) -> Result<QueueBoard, ServiceError> {
    let Some(queue) = store.find_queue(queue_id).await? else {
        return Err(ServiceError::NotFound(format!("queue `{queue_id}` not found")));
    };
    let participants = store.list_participants(queue_id).await?;
    Ok(QueueBoard::new(
        queue.into(),
        participants.into_iter().map(Into::into).collect(),
    ))
}

/// Commit `changes` as one versioned write. Nothing is written for an empty
/// step; otherwise the queue record always goes along so its version moves.
async fn persist(
    store: &Arc<dyn QueueStore>,
    board: &mut QueueBoard,
    changes: &[BoardChange],
) -> Result<(), StorageError> {
    if changes.is_empty() {
        return Ok(());
    }

    let mut participants = Vec::with_capacity(changes.len());
    for change in changes {
        match change {
            BoardChange::Queue => {}
            BoardChange::Joined(participant_id) => {
                if let Some(participant) = board.participant(*participant_id) {
                    participants.push(ParticipantWrite::Insert(participant.clone().into()));
                }
            }
            BoardChange::Status {
                participant_id,
                status,
            } => participants.push(ParticipantWrite::SetStatus {
                participant_id: *participant_id,
                status: *status,
            }),
            BoardChange::Left(participant_id) => {
                participants.push(ParticipantWrite::Delete(*participant_id));
            }
        }
    }

    let expected_version = board.queue().version;
    let mut queue = QueueEntity::from(board.queue().clone());
    queue.version = expected_version + 1;
    store
        .commit_board(BoardWrite {
            queue,
            expected_version,
            participants,
        })
        .await?;
    board.queue_mut().version = expected_version + 1;
    Ok(())
}

/// Load, reconcile, run `op` and persist. The caller must hold the queue lock.
///
/// Reconciliation changes are persisted even when `op` is rejected; the
/// rejection is carried in [`Committed::outcome`].
async fn commit<T, F>(
    state: &SharedState,
    store: &Arc<dyn QueueStore>,
    queue_id: QueueId,
    op: &mut F,
) -> Result<Committed<T>, ServiceError>
where
    F: FnMut(&mut QueueBoard, OffsetDateTime) -> Result<(T, Transition), ServiceError>,
{
    let attempts = state.config().conflict_attempts();
    let mut attempt = 1;

    loop {
        let now = state.now();
        let mut board = load_board(store, queue_id).await?;
        let status_before = board.queue().status;
        let mut transition = lifecycle::reconcile(&mut board, now);

        let outcome = match op(&mut board, now) {
            Ok((value, step)) => {
                transition.merge(step);
                Ok(value)
            }
            Err(err) => Err(err),
        };

        match persist(store, &mut board, &transition.changes).await {
            Ok(()) => {
                return Ok(Committed {
                    outcome,
                    board,
                    transition,
                    status_before,
                });
            }
            Err(err) if err.is_conflict() && attempt < attempts => {
                warn!(queue_id = %queue_id, attempt, error = %err, "storage conflict; retrying");
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Forward the side effects of a committed step. Called without the lock.
fn publish<T>(state: &SharedState, committed: &Committed<T>, queue_event: Option<&'static str>) {
    let board = &committed.board;
    let queue = board.queue();

    if queue.status != committed.status_before {
        info!(
            queue_id = %queue.id,
            from = committed.status_before.as_str(),
            to = queue.status.as_str(),
            "queue status changed"
        );
        sse_events::broadcast_queue(state, sse_events::EVENT_QUEUE_STATUS, board);
    }
    if let (Some(event), Ok(_)) = (queue_event, &committed.outcome) {
        sse_events::broadcast_queue(state, event, board);
    }
    if committed
        .transition
        .changes
        .iter()
        .any(|change| !matches!(change, BoardChange::Queue))
    {
        sse_events::broadcast_participants_changed(state, board);
    }

    for notice in &committed.transition.notices {
        debug!(
            queue_id = %notice.queue_id,
            participant_id = %notice.participant_id,
            "dispatching turn notice"
        );
        state.notifications().dispatch(notice.clone());
    }
}

/// Run `op` against one queue under its lock and publish the outcome.
async fn mutate<T, F>(
    state: &SharedState,
    queue_id: QueueId,
    queue_event: Option<&'static str>,
    mut op: F,
) -> Result<(T, QueueBoard), ServiceError>
where
    F: FnMut(&mut QueueBoard, OffsetDateTime) -> Result<(T, Transition), ServiceError>,
{
    let store = state.require_queue_store().await?;
    let committed = {
        let _guard = state.lock_queue(queue_id).await;
        commit(state, &store, queue_id, &mut op).await?
    };

    publish(state, &committed, queue_event);
    let Committed { outcome, board, .. } = committed;
    outcome.map(|value| (value, board))
}

/// Reconcile one queue if the caller can get its lock without waiting.
/// Returns `None` when the queue is busy.
pub(crate) async fn try_reconcile(
    state: &SharedState,
    store: &Arc<dyn QueueStore>,
    queue_id: QueueId,
) -> Option<Result<bool, ServiceError>> {
    let guard = state.try_lock_queue(queue_id)?;
    let committed = commit(state, store, queue_id, &mut read_only).await;
    drop(guard);

    Some(committed.map(|committed| {
        publish(state, &committed, None);
        !committed.transition.is_empty()
    }))
}

fn read_only(_: &mut QueueBoard, _: OffsetDateTime) -> Result<((), Transition), ServiceError> {
    Ok(((), Transition::default()))
}

fn ensure_visible(actor: &Actor, queue: &Queue) -> Result<(), ServiceError> {
    if actor.can_see(queue) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(format!(
            "queue `{}` is not open to your groups",
            queue.id
        )))
    }
}

fn ensure_manager(actor: &Actor, queue: &Queue) -> Result<(), ServiceError> {
    if actor.can_manage(queue) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(
            "only the owner or an administrator may change this queue".into(),
        ))
    }
}

fn same_slot(existing: &QueueEntity, queue: &Queue) -> bool {
    OffsetDateTime::from(existing.scheduled_start) == queue.window.start()
        && OffsetDateTime::from(existing.scheduled_end) == queue.window.end()
        && existing.discipline.eq_ignore_ascii_case(&queue.discipline)
        && existing
            .eligible_groups
            .iter()
            .any(|group| queue.eligible_groups.contains(group))
}

// ---------------------------------------------------------------------------
// Queue management
// ---------------------------------------------------------------------------

/// Schedule a new queue owned by `actor`.
pub async fn create_queue(
    state: &SharedState,
    actor: &Actor,
    request: CreateQueueRequest,
) -> Result<QueueSummary, ServiceError> {
    let store = state.require_queue_store().await?;
    let now = state.now();

    let window = ScheduleWindow::new(request.scheduled_start, request.scheduled_end)?;
    window.check_schedulable(now, state.config().schedule_lead())?;

    let queue = Queue::new(
        NewQueue {
            title: request.title.trim().to_owned(),
            description: request.description,
            discipline: request.discipline.trim().to_owned(),
            window,
            eligible_groups: group_set(request.eligible_groups),
        },
        actor.id,
        now,
    );

    let board = {
        let _guard = state.lock_creation().await;
        let open = store.list_queues(QueueScope::Open).await?;
        if open.iter().any(|existing| same_slot(existing, &queue)) {
            return Err(ServiceError::AlreadyExists);
        }

        let mut board = QueueBoard::new(queue, Vec::new());
        lifecycle::reconcile(&mut board, now);
        store.insert_queue(board.queue().clone().into()).await?;
        board
    };

    info!(
        queue_id = %board.queue().id,
        owner_id = %actor.id,
        status = board.queue().status.as_str(),
        "queue created"
    );
    sse_events::broadcast_queue(state, sse_events::EVENT_QUEUE_CREATED, &board);
    Ok(QueueSummary::from(&board))
}

/// Apply an owner/admin edit, then reconcile against the edited window.
pub async fn update_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
    request: UpdateQueueRequest,
) -> Result<QueueSummary, ServiceError> {
    let edit = QueueEdit::from(request);
    let lead = state.config().schedule_lead();

    let (_, board) = mutate(
        state,
        queue_id,
        Some(sse_events::EVENT_QUEUE_UPDATED),
        |board, now| {
            ensure_manager(actor, board.queue())?;
            board.queue_mut().apply_edit(edit.clone(), now, lead)?;
            let mut transition = Transition::default();
            transition.push_change(BoardChange::Queue);
            transition.merge(lifecycle::reconcile(board, now));
            Ok(((), transition))
        },
    )
    .await?;

    info!(queue_id = %queue_id, actor_id = %actor.id, "queue updated");
    Ok(QueueSummary::from(&board))
}

/// Delete a queue and all of its participants.
pub async fn delete_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<ActionResponse, ServiceError> {
    let store = state.require_queue_store().await?;
    {
        let _guard = state.lock_queue(queue_id).await;
        let board = load_board(&store, queue_id).await?;
        ensure_manager(actor, board.queue())?;
        if !store.delete_queue(queue_id).await? {
            return Err(ServiceError::NotFound(format!("queue `{queue_id}` not found")));
        }
    }
    state.forget_queue_lock(queue_id);

    info!(queue_id = %queue_id, actor_id = %actor.id, "queue deleted");
    sse_events::broadcast_queue_deleted(state, queue_id);
    Ok(ActionResponse::new(format!("queue {queue_id} deleted")))
}

/// List the queues visible to `actor`, each reconciled before filtering.
pub async fn list_queues(
    state: &SharedState,
    actor: &Actor,
    query: ListQueuesQuery,
) -> Result<Vec<QueueSummary>, ServiceError> {
    let store = state.require_queue_store().await?;
    let discipline = query.discipline.as_deref().map(str::trim);
    let search = query
        .search
        .as_deref()
        .map(|search| search.trim().to_lowercase())
        .filter(|search| !search.is_empty());

    let candidates: Vec<Queue> = store
        .list_queues(QueueScope::All)
        .await?
        .into_iter()
        .map(Queue::from)
        .filter(|queue| actor.can_see(queue))
        .filter(|queue| {
            discipline.is_none_or(|discipline| queue.discipline.eq_ignore_ascii_case(discipline))
        })
        .filter(|queue| search.as_deref().is_none_or(|search| matches_search(queue, search)))
        .collect();

    let mut summaries = Vec::with_capacity(candidates.len());
    for queue in candidates {
        let board = if lifecycle::may_change(&queue, state.now()) {
            mutate(state, queue.id, None, read_only).await.map(|(_, board)| board)
        } else {
            load_board(&store, queue.id).await
        };
        let board = match board {
            Ok(board) => board,
            // Deleted while listing.
            Err(ServiceError::NotFound(_)) => continue,
            Err(err) => return Err(err),
        };
        if query.status.matches(board.queue().status) {
            summaries.push(QueueSummary::from(&board));
        }
    }

    Ok(summaries)
}

fn matches_search(queue: &Queue, needle: &str) -> bool {
    queue.title.to_lowercase().contains(needle)
        || queue.discipline.to_lowercase().contains(needle)
        || queue
            .eligible_groups
            .iter()
            .any(|group| group.to_lowercase().contains(needle))
}

/// Queue with its ordered participant list.
pub async fn get_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<QueueDetail, ServiceError> {
    let (_, board) = mutate(state, queue_id, None, |board, _| {
        ensure_visible(actor, board.queue())?;
        Ok(((), Transition::default()))
    })
    .await?;
    Ok(QueueDetail::from(&board))
}

/// Participants of one queue in wait order.
pub async fn list_participants(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<Vec<ParticipantView>, ServiceError> {
    let (_, board) = mutate(state, queue_id, None, |board, _| {
        ensure_visible(actor, board.queue())?;
        Ok(((), Transition::default()))
    })
    .await?;
    Ok(turns::list_participants(&board)
        .iter()
        .map(ParticipantView::from)
        .collect())
}

// ---------------------------------------------------------------------------
// Turn taking
// ---------------------------------------------------------------------------

/// Put `actor` at the end of the queue.
pub async fn join_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<ParticipantView, ServiceError> {
    let (participant_id, board) = mutate(state, queue_id, None, |board, now| {
        let (participant_id, mut transition) = turns::join(board, actor, now)?;
        // A join into an active queue with an empty slot is served right away.
        transition.merge(lifecycle::reconcile(board, now));
        Ok((participant_id, transition))
    })
    .await?;

    let participant = board
        .participant(participant_id)
        .map(ParticipantView::from)
        .ok_or_else(|| ServiceError::NotFound(format!("participant `{participant_id}` not found")))?;
    info!(
        queue_id = %queue_id,
        participant_id = %participant_id,
        position = participant.position,
        status = participant.status.as_str(),
        "participant joined"
    );
    Ok(participant)
}

/// Remove `actor` from the queue. A vacated current slot is refilled by the
/// next reconciliation, not by the leave itself.
pub async fn leave_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<ActionResponse, ServiceError> {
    let (removed, _) = mutate(state, queue_id, None, |board, _| {
        turns::leave(board, actor).map_err(Into::into)
    })
    .await?;

    info!(queue_id = %queue_id, participant_id = %removed.id, "participant left");
    Ok(ActionResponse::new(format!(
        "left queue {queue_id} (position {})",
        removed.position
    )))
}

/// Finish `actor`'s turn and pass the slot to the next waiting participant.
pub async fn complete_turn(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<QueueDetail, ServiceError> {
    let (_, board) = mutate(state, queue_id, None, |board, _| {
        turns::complete(board, actor)
            .map(|transition| ((), transition))
            .map_err(Into::into)
    })
    .await?;

    info!(
        queue_id = %queue_id,
        next = ?board.current().map(|participant| participant.id),
        "turn completed"
    );
    Ok(QueueDetail::from(&board))
}

/// Close the queue before its scheduled end. Owner only.
pub async fn close_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<QueueSummary, ServiceError> {
    close_with(state, actor, queue_id, CloseReason::Owner).await
}

/// Close any queue regardless of ownership. Administrators only.
pub async fn force_close_queue(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
) -> Result<QueueSummary, ServiceError> {
    close_with(state, actor, queue_id, CloseReason::Admin).await
}

async fn close_with(
    state: &SharedState,
    actor: &Actor,
    queue_id: QueueId,
    reason: CloseReason,
) -> Result<QueueSummary, ServiceError> {
    let (_, board) = mutate(state, queue_id, None, |board, now| {
        let allowed = match reason {
            CloseReason::Owner => actor.owns(board.queue()),
            CloseReason::Admin => actor.is_admin(),
            CloseReason::Schedule => false,
        };
        if !allowed {
            return Err(ServiceError::PermissionDenied(match reason {
                CloseReason::Admin => "force-closing requires an administrator".into(),
                _ => "only the owner may close this queue".into(),
            }));
        }
        let transition = lifecycle::close(board, reason, now)?;
        Ok(((), transition))
    })
    .await?;

    info!(queue_id = %queue_id, actor_id = %actor.id, reason = ?reason, "queue closed");
    Ok(QueueSummary::from(&board))
}
