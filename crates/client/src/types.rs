//! Wire types for the File Browser API and upload results.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// An entry inside a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub modified: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub mode: i64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub is_symlink: bool,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Listing order reported for a directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sorting {
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub asc: bool,
}

/// Resource metadata returned by `GET /api/resources/{path}`.
///
/// `items`, `num_dirs`, `num_files` and `sorting` are only populated for
/// directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub items: Vec<ResourceItem>,
    #[serde(default)]
    pub num_dirs: u64,
    #[serde(default)]
    pub num_files: u64,
    #[serde(default)]
    pub sorting: Sorting,

    pub path: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub modified: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub mode: i64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub is_symlink: bool,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Body of `GET /api/resources/{path}?checksum=sha256`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChecksumResponse {
    pub checksums: Checksums,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Checksums {
    #[serde(default)]
    pub sha256: String,
}

/// Body of `POST /api/login`.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub recaptcha: &'a str,
}

/// Per-file upload behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Truncate the remote file on create (`override=true`). Disables resumption.
    #[serde(default)]
    pub overwrite: bool,

    /// Compare server and local SHA-256 once the server holds every byte.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            verify_checksum: default_true(),
        }
    }
}

/// What a single upload attempt had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server already held every byte; no data was sent.
    AlreadyComplete,
    /// Sent `bytes` bytes starting at `offset`.
    Uploaded { offset: u64, bytes: u64 },
}
