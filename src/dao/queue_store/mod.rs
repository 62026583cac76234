//! Storage seam for queues and their participants.

/// In-process store.
pub mod memory;
#[cfg(feature = "mongo-store")]
/// MongoDB-backed store.
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{BoardWrite, ParticipantEntity, QueueEntity, QueueScope};
use crate::dao::storage::StorageResult;

pub use memory::MemoryQueueStore;

/// Abstraction over the persistence layer for queues and their participants.
///
/// Every change to an existing queue goes through [`QueueStore::commit_board`],
/// which applies the queue record and its participant writes atomically and
/// only if nobody committed to the queue since it was loaded. A stale version,
/// a second record with the same position or subject, or a second `current`
/// participant fails with
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict) and
/// leaves the stored queue untouched.
pub trait QueueStore: Send + Sync {
    /// Short backend name reported by the health check.
    fn backend(&self) -> &'static str;
    /// Insert a brand new queue; fails with a conflict when the id exists.
    fn insert_queue(&self, queue: QueueEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Apply one step's writes all-or-nothing, guarded by the queue version.
    fn commit_board(&self, write: BoardWrite) -> BoxFuture<'static, StorageResult<()>>;
    /// Load one queue record.
    fn find_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QueueEntity>>>;
    /// Queues in `scope`, ordered by scheduled start.
    fn list_queues(&self, scope: QueueScope) -> BoxFuture<'static, StorageResult<Vec<QueueEntity>>>;
    /// Delete a queue and all of its participants. Returns whether it existed.
    fn delete_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Participants of one queue in position order.
    fn list_participants(
        &self,
        queue_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Cheap liveness check.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
