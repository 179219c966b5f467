//! Upload manager for File Browser batches.
//!
//! A batch (destination directory plus local paths) is written to the
//! [`WriteAheadLog`](fbupload_wal::WriteAheadLog) before it is acknowledged,
//! then queued. One worker per batch uploads its unfinished items through an
//! [`ItemUploader`], marking each finished in the log as it succeeds. On
//! start, batches left over from a previous run are recovered.
//!
//! Progress and failures are reported as [`UploadEvent`]s on a channel
//! obtained from [`UploadManager::take_events`].

mod config;
mod error;
mod events;
mod manager;
mod uploader;
mod worker;

pub use config::{ManagerConfig, RetryConfig};
pub use error::ManagerError;
pub use events::UploadEvent;
pub use manager::UploadManager;
pub use uploader::{ItemUploader, SessionUploader, UploadFuture};
