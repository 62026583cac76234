/// Database model definitions.
pub mod models;
/// Queue and participant persistence.
pub mod queue_store;
/// Storage abstraction layer for database operations.
pub mod storage;
