//! Upload manager errors.

use std::path::PathBuf;

use fbupload_wal::WalError;

/// Errors returned by [`UploadManager`](crate::UploadManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("write-ahead log error: {0}")]
    Wal(#[from] WalError),

    #[error("upload manager already started")]
    AlreadyStarted,

    #[error("upload manager not started")]
    NotStarted,

    #[error("upload manager stopped")]
    Stopped,

    #[error("local path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for ManagerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}
