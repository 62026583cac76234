use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel, bson::doc, error::Error as MongoError,
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoParticipantDocument, MongoQueueDocument, doc_id, participant_key, versioned_id,
    },
};
use crate::dao::{
    models::{BoardWrite, ParticipantEntity, ParticipantWrite, QueueEntity, QueueScope},
    queue_store::QueueStore,
    storage::StorageResult,
};
use crate::state::queue::{ParticipantStatus, QueueStatus};

const QUEUE_COLLECTION_NAME: &str = "queues";
const PARTICIPANT_COLLECTION_NAME: &str = "participants";

/// MongoDB-backed [`QueueStore`]. Uniqueness of positions, subjects and the
/// current slot is enforced by unique indexes, and each board commit runs in a
/// transaction guarded by the queue version, so several processes can share
/// one database. Transactions need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoQueueStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    connection: RwLock<Connection>,
    config: MongoConfig,
}

struct Connection {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.connection.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        *self.connection.write().await = Connection { client, database };
        Ok(())
    }
}

impl MongoQueueStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                connection: RwLock::new(Connection { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        info!(database = %store.inner.config.database_name, "MongoDB queue store ready");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let participants = self.participants().await;
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(true))
                .build()
        };

        let indexes = [
            (
                "queue_id,position",
                IndexModel::builder()
                    .keys(doc! {"queue_id": 1, "position": 1})
                    .options(unique("participant_position_idx"))
                    .build(),
            ),
            (
                "queue_id,subject_id",
                IndexModel::builder()
                    .keys(doc! {"queue_id": 1, "subject_id": 1})
                    .options(unique("participant_subject_idx"))
                    .build(),
            ),
            (
                "queue_id where current",
                IndexModel::builder()
                    .keys(doc! {"queue_id": 1})
                    .options(
                        IndexOptions::builder()
                            .name(Some("participant_current_idx".to_owned()))
                            .unique(Some(true))
                            .partial_filter_expression(Some(
                                doc! {"status": ParticipantStatus::Current.as_str()},
                            ))
                            .build(),
                    )
                    .build(),
            ),
        ];
        for (index, model) in indexes {
            participants
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: PARTICIPANT_COLLECTION_NAME,
                    index,
                    source,
                })?;
        }

        self.queues()
            .await
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"status": 1, "scheduled_start": 1})
                    .options(
                        IndexOptions::builder()
                            .name(Some("queue_status_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: QUEUE_COLLECTION_NAME,
                index: "status,scheduled_start",
                source,
            })?;

        Ok(())
    }

    async fn queues(&self) -> Collection<MongoQueueDocument> {
        self.inner
            .connection
            .read()
            .await
            .database
            .collection::<MongoQueueDocument>(QUEUE_COLLECTION_NAME)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.inner
            .connection
            .read()
            .await
            .database
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION_NAME)
    }

    async fn insert_queue(&self, queue: QueueEntity) -> MongoResult<()> {
        let id = queue.id;
        let document: MongoQueueDocument = queue.into();
        self.queues()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::WriteQueue { id, source })?;
        Ok(())
    }

    /// Run one board write inside a transaction.
    async fn commit_board(&self, write: BoardWrite) -> MongoResult<()> {
        let queue_id = write.queue.id;
        let transaction = |source: MongoError| MongoDaoError::Transaction { queue_id, source };
        let client = self.inner.connection.read().await.client.clone();

        let mut session = client.start_session().await.map_err(transaction)?;
        session.start_transaction().await.map_err(transaction)?;

        match self.write_board(&mut session, write).await {
            Ok(()) => session.commit_transaction().await.map_err(transaction),
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(queue_id = %queue_id, error = %abort, "failed to abort transaction");
                }
                Err(err)
            }
        }
    }

    async fn write_board(&self, session: &mut ClientSession, write: BoardWrite) -> MongoResult<()> {
        let BoardWrite {
            queue,
            expected_version,
            participants: ops,
        } = write;
        let queue_id = queue.id;

        // Claim the version first so a stale writer fails before touching rows.
        let document: MongoQueueDocument = queue.into();
        let replaced = self
            .queues()
            .await
            .replace_one(versioned_id(queue_id, expected_version), &document)
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::WriteQueue { id: queue_id, source })?;
        if replaced.matched_count == 0 {
            return Err(MongoDaoError::StaleQueue {
                id: queue_id,
                expected: expected_version,
            });
        }

        let participants = self.participants().await;
        for op in ops {
            match op {
                ParticipantWrite::Insert(participant) => {
                    let participant_id = participant.id;
                    let document: MongoParticipantDocument = participant.into();
                    participants
                        .insert_one(&document)
                        .session(&mut *session)
                        .await
                        .map_err(|source| MongoDaoError::WriteParticipant {
                            queue_id,
                            participant_id,
                            source,
                        })?;
                }
                ParticipantWrite::SetStatus {
                    participant_id,
                    status,
                } => {
                    let result = participants
                        .update_one(
                            participant_key(queue_id, participant_id),
                            doc! {"$set": {"status": status.as_str()}},
                        )
                        .session(&mut *session)
                        .await
                        .map_err(|source| MongoDaoError::WriteParticipant {
                            queue_id,
                            participant_id,
                            source,
                        })?;
                    if result.matched_count == 0 {
                        return Err(MongoDaoError::MissingParticipant {
                            queue_id,
                            participant_id,
                        });
                    }
                }
                ParticipantWrite::Delete(participant_id) => {
                    participants
                        .delete_one(participant_key(queue_id, participant_id))
                        .session(&mut *session)
                        .await
                        .map_err(|source| MongoDaoError::WriteParticipant {
                            queue_id,
                            participant_id,
                            source,
                        })?;
                }
            }
        }
        Ok(())
    }

    async fn find_queue(&self, id: Uuid) -> MongoResult<Option<QueueEntity>> {
        let document = self
            .queues()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadQueue { id, source })?;
        document.map(QueueEntity::try_from).transpose()
    }

    async fn list_queues(&self, scope: QueueScope) -> MongoResult<Vec<QueueEntity>> {
        let filter = match scope {
            QueueScope::All => doc! {},
            QueueScope::Open => doc! {"status": {"$ne": QueueStatus::Closed.as_str()}},
        };
        let documents: Vec<MongoQueueDocument> = self
            .queues()
            .await
            .find(filter)
            .sort(doc! {"scheduled_start": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::ListQueues { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListQueues { source })?;

        documents.into_iter().map(QueueEntity::try_from).collect()
    }

    async fn delete_queue(&self, id: Uuid) -> MongoResult<bool> {
        self.participants()
            .await
            .delete_many(doc! {"queue_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::DeleteQueue { id, source })?;
        let result = self
            .queues()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteQueue { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_participants(&self, queue_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(doc! {"queue_id": queue_id.to_string()})
            .sort(doc! {"position": 1})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { queue_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { queue_id, source })?;

        documents.into_iter().map(ParticipantEntity::try_from).collect()
    }
}

impl QueueStore for MongoQueueStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn insert_queue(&self, queue: QueueEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_queue(queue).await.map_err(Into::into) })
    }

    fn commit_board(&self, write: BoardWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit_board(write).await.map_err(Into::into) })
    }

    fn find_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QueueEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_queue(id).await.map_err(Into::into) })
    }

    fn list_queues(&self, scope: QueueScope) -> BoxFuture<'static, StorageResult<Vec<QueueEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_queues(scope).await.map_err(Into::into) })
    }

    fn delete_queue(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_queue(id).await.map_err(Into::into) })
    }

    fn list_participants(
        &self,
        queue_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(queue_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
