//! Process-local store used when no database is configured and in tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, ready};
use uuid::Uuid;

use crate::dao::{
    models::{BoardWrite, ParticipantEntity, ParticipantWrite, QueueEntity, QueueScope},
    queue_store::QueueStore,
    storage::{StorageError, StorageResult},
};
use crate::state::queue::{ParticipantStatus, QueueStatus};

/// In-memory [`QueueStore`] enforcing the same uniqueness rules as the
/// MongoDB indexes.
#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    inner: Arc<DashMap<Uuid, StoredQueue>>,
}

/// A queue and its participants, kept in position order. Both live in one map
/// entry so a commit swaps them together.
#[derive(Clone)]
struct StoredQueue {
    queue: QueueEntity,
    participants: Vec<ParticipantEntity>,
}

impl MemoryQueueStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_queue(&self, queue: QueueEntity) -> StorageResult<()> {
        match self.inner.entry(queue.id) {
            Entry::Occupied(_) => Err(StorageError::conflict(format!(
                "queue {} already exists",
                queue.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(StoredQueue {
                    queue,
                    participants: Vec::new(),
                });
                Ok(())
            }
        }
    }

    fn commit_board(&self, write: BoardWrite) -> StorageResult<()> {
        let queue_id = write.queue.id;
        let Some(mut stored) = self.inner.get_mut(&queue_id) else {
            return Err(StorageError::conflict(format!(
                "queue {queue_id} no longer exists"
            )));
        };
        if stored.queue.version != write.expected_version {
            return Err(StorageError::conflict(format!(
                "queue {queue_id} moved from version {} to {}",
                write.expected_version, stored.queue.version
            )));
        }

        let mut rows = stored.participants.clone();
        for op in write.participants {
            apply(&mut rows, queue_id, op)?;
        }
        stored.queue = write.queue;
        stored.participants = rows;
        Ok(())
    }

    fn list_queues(&self, scope: QueueScope) -> Vec<QueueEntity> {
        let mut queues: Vec<QueueEntity> = self
            .inner
            .iter()
            .filter(|entry| scope == QueueScope::All || entry.queue.status != QueueStatus::Closed)
            .map(|entry| entry.queue.clone())
            .collect();
        queues.sort_by_key(|queue| (queue.scheduled_start, queue.id));
        queues
    }

    fn list_participants(&self, queue_id: Uuid) -> Vec<ParticipantEntity> {
        self.inner
            .get(&queue_id)
            .map(|entry| entry.participants.clone())
            .unwrap_or_default()
    }
}

/// Apply one participant write to a staged copy of the rows.
fn apply(
    rows: &mut Vec<ParticipantEntity>,
    queue_id: Uuid,
    op: ParticipantWrite,
) -> StorageResult<()> {
    match op {
        ParticipantWrite::Insert(participant) => {
            if let Some(clash) = rows.iter().find(|row| {
                row.position == participant.position
                    || row.subject_id == participant.subject_id
                    || (row.status == ParticipantStatus::Current
                        && participant.status == ParticipantStatus::Current)
            }) {
                return Err(StorageError::conflict(format!(
                    "participant {} clashes with {} in queue {queue_id}",
                    participant.id, clash.id
                )));
            }
            let index = rows.partition_point(|row| row.position < participant.position);
            rows.insert(index, participant);
        }
        ParticipantWrite::SetStatus {
            participant_id,
            status,
        } => {
            if status == ParticipantStatus::Current
                && rows
                    .iter()
                    .any(|row| row.status == ParticipantStatus::Current && row.id != participant_id)
            {
                return Err(StorageError::conflict(format!(
                    "queue {queue_id} already has a current participant"
                )));
            }
            let Some(row) = rows.iter_mut().find(|row| row.id == participant_id) else {
                return Err(StorageError::conflict(format!(
                    "participant {participant_id} vanished from queue {queue_id}"
                )));
            };
            row.status = status;
        }
        ParticipantWrite::Delete(participant_id) => {
            rows.retain(|row| row.id != participant_id);
        }
    }
    Ok(())
}

impl QueueStore for MemoryQueueStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn insert_queue(&self, queue: QueueEntity) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(MemoryQueueStore::insert_queue(self, queue)))
    }

    fn commit_board(&self, write: BoardWrite) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(MemoryQueueStore::commit_board(self, write)))
    }

    fn find_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QueueEntity>>> {
        let found = self.inner.get(&id).map(|entry| entry.queue.clone());
        Box::pin(ready(Ok(found)))
    }

    fn list_queues(&self, scope: QueueScope) -> BoxFuture<'static, StorageResult<Vec<QueueEntity>>> {
        Box::pin(ready(Ok(MemoryQueueStore::list_queues(self, scope))))
    }

    fn delete_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        Box::pin(ready(Ok(self.inner.remove(&id).is_some())))
    }

    fn list_participants(
        &self,
        queue_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        Box::pin(ready(Ok(MemoryQueueStore::list_participants(self, queue_id))))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn queue() -> QueueEntity {
        let now = SystemTime::now();
        QueueEntity {
            id: Uuid::new_v4(),
            title: "Lab 1".into(),
            description: None,
            discipline: "Databases".into(),
            scheduled_start: now,
            scheduled_end: now + Duration::from_secs(3600),
            owner_id: Uuid::new_v4(),
            eligible_groups: vec!["IU7-51".into()],
            status: QueueStatus::Active,
            created_at: now,
            closed_at: None,
            close_reason: None,
            last_position: 0,
            version: 0,
        }
    }

    fn participant(queue_id: Uuid, position: u32, status: ParticipantStatus) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            queue_id,
            subject_id: Uuid::new_v4(),
            display_name: format!("p{position}"),
            contact: None,
            position,
            status,
            joined_at: SystemTime::now(),
        }
    }

    /// Commit `ops` on top of whatever version the store holds.
    fn write(store: &MemoryQueueStore, queue_id: Uuid, ops: Vec<ParticipantWrite>) -> StorageResult<()> {
        let mut queue = store.inner.get(&queue_id).map(|entry| entry.queue.clone()).unwrap();
        let expected_version = queue.version;
        queue.version += 1;
        store.commit_board(BoardWrite {
            queue,
            expected_version,
            participants: ops,
        })
    }

    #[test]
    fn duplicate_position_subject_or_current_conflicts() {
        let store = MemoryQueueStore::new();
        let queue = queue();
        store.insert_queue(queue.clone()).unwrap();

        let first = participant(queue.id, 1, ParticipantStatus::Current);
        write(&store, queue.id, vec![ParticipantWrite::Insert(first.clone())]).unwrap();

        let same_position = participant(queue.id, 1, ParticipantStatus::Waiting);
        assert!(
            write(&store, queue.id, vec![ParticipantWrite::Insert(same_position)])
                .unwrap_err()
                .is_conflict()
        );

        let mut same_subject = participant(queue.id, 2, ParticipantStatus::Waiting);
        same_subject.subject_id = first.subject_id;
        assert!(
            write(&store, queue.id, vec![ParticipantWrite::Insert(same_subject)])
                .unwrap_err()
                .is_conflict()
        );

        let second_current = participant(queue.id, 3, ParticipantStatus::Current);
        assert!(
            write(&store, queue.id, vec![ParticipantWrite::Insert(second_current)])
                .unwrap_err()
                .is_conflict()
        );

        let waiting = participant(queue.id, 4, ParticipantStatus::Waiting);
        write(&store, queue.id, vec![ParticipantWrite::Insert(waiting.clone())]).unwrap();
        let promote = ParticipantWrite::SetStatus {
            participant_id: waiting.id,
            status: ParticipantStatus::Current,
        };
        assert!(
            write(&store, queue.id, vec![promote.clone()])
                .unwrap_err()
                .is_conflict()
        );

        let finish = ParticipantWrite::SetStatus {
            participant_id: first.id,
            status: ParticipantStatus::Done,
        };
        write(&store, queue.id, vec![finish, promote]).unwrap();
    }

    #[test]
    fn stale_version_writes_nothing() {
        let store = MemoryQueueStore::new();
        let queue = queue();
        store.insert_queue(queue.clone()).unwrap();

        let mut closed = queue.clone();
        closed.status = QueueStatus::Closed;
        closed.version = 1;
        store
            .commit_board(BoardWrite {
                queue: closed,
                expected_version: 0,
                participants: Vec::new(),
            })
            .unwrap();

        // A writer that loaded version 0 before the close loses.
        let mut reopened = queue.clone();
        reopened.last_position = 1;
        reopened.version = 1;
        let err = store
            .commit_board(BoardWrite {
                queue: reopened,
                expected_version: 0,
                participants: vec![ParticipantWrite::Insert(participant(
                    queue.id,
                    1,
                    ParticipantStatus::Waiting,
                ))],
            })
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = store.inner.get(&queue.id).unwrap().queue.clone();
        assert_eq!(stored.status, QueueStatus::Closed);
        assert!(store.list_participants(queue.id).is_empty());
    }

    #[test]
    fn failed_step_rolls_back_earlier_writes() {
        let store = MemoryQueueStore::new();
        let queue = queue();
        store.insert_queue(queue.clone()).unwrap();
        let current = participant(queue.id, 1, ParticipantStatus::Current);
        let waiting = participant(queue.id, 2, ParticipantStatus::Waiting);
        write(
            &store,
            queue.id,
            vec![
                ParticipantWrite::Insert(current.clone()),
                ParticipantWrite::Insert(waiting.clone()),
            ],
        )
        .unwrap();

        let err = write(
            &store,
            queue.id,
            vec![
                ParticipantWrite::SetStatus {
                    participant_id: current.id,
                    status: ParticipantStatus::Done,
                },
                ParticipantWrite::SetStatus {
                    participant_id: Uuid::new_v4(),
                    status: ParticipantStatus::Current,
                },
            ],
        )
        .unwrap_err();
        assert!(err.is_conflict());

        let statuses: Vec<_> = store
            .list_participants(queue.id)
            .into_iter()
            .map(|row| row.status)
            .collect();
        assert_eq!(statuses, [ParticipantStatus::Current, ParticipantStatus::Waiting]);
        assert_eq!(store.inner.get(&queue.id).unwrap().queue.version, 1);
    }

    #[test]
    fn participants_come_back_in_position_order() {
        let store = MemoryQueueStore::new();
        let queue = queue();
        store.insert_queue(queue.clone()).unwrap();
        let ops = [3, 1, 2]
            .into_iter()
            .map(|position| {
                ParticipantWrite::Insert(participant(queue.id, position, ParticipantStatus::Waiting))
            })
            .collect();
        write(&store, queue.id, ops).unwrap();

        let positions: Vec<u32> = store
            .list_participants(queue.id)
            .into_iter()
            .map(|row| row.position)
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn deleting_a_queue_drops_its_participants() {
        let store = MemoryQueueStore::new();
        let queue = queue();
        store.insert_queue(queue.clone()).unwrap();
        write(
            &store,
            queue.id,
            vec![ParticipantWrite::Insert(participant(
                queue.id,
                1,
                ParticipantStatus::Waiting,
            ))],
        )
        .unwrap();

        assert!(QueueStore::delete_queue(&store, queue.id).await.unwrap());
        assert!(!QueueStore::delete_queue(&store, queue.id).await.unwrap());
        assert!(store.list_participants(queue.id).is_empty());
        assert!(store.insert_queue(queue.clone()).is_ok());
        assert!(store.list_participants(queue.id).is_empty());
    }

    #[test]
    fn open_scope_skips_closed_queues() {
        let store = MemoryQueueStore::new();
        let open = queue();
        let mut closed = queue();
        closed.status = QueueStatus::Closed;
        store.insert_queue(open.clone()).unwrap();
        store.insert_queue(closed).unwrap();

        let listed = store.list_queues(QueueScope::Open);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
        assert_eq!(store.list_queues(QueueScope::All).len(), 2);
    }
}
