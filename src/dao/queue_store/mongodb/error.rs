use mongodb::error::{
    Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT, WriteFailure,
};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for the MongoDB backend.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY: i32 = 11000;

/// Failures of the MongoDB backend, mapped onto `StorageError` at the seam.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is unset.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection URI did not parse.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as configured.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered during startup.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings tried.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Queue insert or replace failed.
    #[error("failed to write queue `{id}`")]
    WriteQueue {
        /// Queue id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Queue lookup failed.
    #[error("failed to load queue `{id}`")]
    LoadQueue {
        /// Queue id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Queue listing failed.
    #[error("failed to list queues")]
    ListQueues {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Queue deletion failed.
    #[error("failed to delete queue `{id}`")]
    DeleteQueue {
        /// Queue id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Participant listing failed.
    #[error("failed to load participants of queue `{queue_id}`")]
    LoadParticipants {
        /// Owning queue.
        queue_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A participant write failed.
    #[error("failed to write participant `{participant_id}` of queue `{queue_id}`")]
    WriteParticipant {
        /// Owning queue.
        queue_id: Uuid,
        /// Participant id.
        participant_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Another writer committed first.
    #[error("queue `{id}` changed since version {expected} was loaded")]
    StaleQueue { id: Uuid, expected: u64 },
    /// A status update matched no participant.
    #[error("participant `{participant_id}` vanished from queue `{queue_id}`")]
    MissingParticipant { queue_id: Uuid, participant_id: Uuid },
    /// Starting, committing or aborting the transaction failed.
    #[error("transaction on queue `{queue_id}` failed")]
    Transaction {
        /// Owning queue.
        queue_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored document could not be mapped.
    #[error("stored document is malformed: {reason}")]
    Malformed { reason: String },
}

impl MongoDaoError {
    /// Whether the write lost a race and may be retried from a fresh read:
    /// a unique index rejected it, the queue version moved, or the server
    /// aborted the transaction for a concurrent writer.
    pub fn is_conflict(&self) -> bool {
        match self {
            MongoDaoError::StaleQueue { .. } | MongoDaoError::MissingParticipant { .. } => true,
            MongoDaoError::WriteQueue { source, .. }
            | MongoDaoError::WriteParticipant { source, .. }
            | MongoDaoError::Transaction { source, .. } => {
                is_duplicate_key(source) || is_retryable_transaction(source)
            }
            _ => false,
        }
    }
}

fn is_retryable_transaction(err: &MongoError) -> bool {
    // An unknown commit result is safe to retry: the version check rejects
    // the replay if the first attempt did land.
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
        || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        _ => false,
    }
}
