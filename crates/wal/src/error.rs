//! WAL error types.

use crate::BatchId;

/// Errors produced by the write-ahead log.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("batch {0} already exists, the batch sequence is inconsistent")]
    BatchExists(BatchId),

    #[error("batch {0} not found")]
    BatchNotFound(BatchId),

    #[error("key {0:?} is reserved and cannot be used as an item path")]
    ReservedKey(String),

    #[error("write-ahead log is corrupt: {0}")]
    Corrupt(String),
}

impl WalError {
    /// Returns `true` for errors that mean the durable state disagrees with
    /// what the code expects (as opposed to an I/O failure of the store).
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::BatchExists(_) | Self::Corrupt(_))
    }
}
