//! Client for a File Browser server.
//!
//! Covers the small HTTP surface the uploader needs:
//!
//! - **Session**: login, resource info and server-side SHA-256 checksums.
//! - **Resumable uploads**: a constrained subset of the TUS protocol
//!   (create, head, patch). The server is asked how many bytes it already
//!   holds and only the remainder is sent, so retrying is always safe.
//! - **Resource cache**: read-through cache of resource info lookups.

mod cache;
mod checksum;
mod error;
mod path;
mod session;
mod tus;
mod types;

pub use cache::ResourceCache;
pub use checksum::{file_prefix_sha256, file_sha256, sha256_hex};
pub use error::{BoxError, ClientError};
pub use path::{clean_remote_path, join_remote_path, remote_file_name};
pub use session::Session;
pub use types::{Resource, ResourceItem, Sorting, UploadOptions, UploadOutcome};

use std::time::Duration;

/// TUS protocol version advertised in `Tus-Resumable`.
pub const TUS_VERSION: &str = "1.0.0";

/// Deadline for metadata calls (login, info, checksum, create, head).
/// Uploads themselves are not bounded.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum accepted size of a resource info response.
pub const INFO_BODY_LIMIT: usize = 1_000_000;

/// Maximum accepted size of a checksum response.
pub const CHECKSUM_BODY_LIMIT: usize = 100_000;
