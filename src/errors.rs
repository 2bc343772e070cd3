//! Crate-wide error taxonomy.
//!
//! Every engine operation returns one of these variants synchronously; nothing
//! is retried internally. Index/log inconsistencies (a deleted record still
//! resolvable through the index, a position-count mismatch after an append)
//! are invariant violations and panic instead of returning an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("key not found in database")]
    KeyNotFound,

    #[error("the database directory is used by another process")]
    DatabaseIsUsing,

    #[error("the batch is read only")]
    ReadOnlyBatch,

    #[error("the batch is committed")]
    BatchCommitted,

    #[error("the batch is rolled back")]
    BatchRolledBack,

    #[error("the database is closed")]
    DBClosed,

    #[error("the merge operation is running")]
    MergeRunning,

    #[error("the watch is disabled")]
    WatchDisabled,

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("corrupted log data: {0}")]
    Corrupted(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
