//! Durable write-ahead log of upload batches.
//!
//! Every upload request is recorded here before it is acknowledged, so a
//! crash at any point leaves enough state behind to resume the work:
//!
//! - [`WriteAheadLog`] owns the `batches` namespace and hands out
//!   sequence-numbered [`Batch`] records.
//! - [`Batch`] tracks which local items are still pending and where they
//!   should land on the remote server.
//! - [`Store`] wraps the embedded SQLite database that provides the
//!   transactions.

mod batch;
mod error;
mod id;
mod store;
mod wal;

pub use batch::Batch;
pub use error::WalError;
pub use id::BatchId;
pub use store::Store;
pub use wal::WriteAheadLog;

/// Schema version recorded under `metadata.version`.
pub const SCHEMA_VERSION: &str = "0.0.1";

/// Reserved key inside every batch namespace holding the destination directory.
pub const DEST_KEY: &str = "dest";

/// Name of the namespace (and its sequence counter) that holds all batches.
pub(crate) const BATCHES_NAMESPACE: &str = "batches";
