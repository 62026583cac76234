mod config;
mod connection;
mod error;
mod models;
/// MongoDB implementation of the store trait.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoQueueStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if err.is_conflict() {
            StorageError::conflict(err.to_string())
        } else {
            StorageError::unavailable(err.to_string(), err)
        }
    }
}
