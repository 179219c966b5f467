//! Client error types and transient-failure classification.

use std::error::Error as StdError;
use std::io;

/// Boxed error used as the source of a resumable failure.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors produced by the File Browser client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// The connection ended mid-transfer. Retrying the whole create/head/patch
    /// sequence is safe: the server reports how far it got.
    #[error("resumable transfer error: {0}")]
    Resumable(#[source] BoxError),

    #[error("{method} {url} returned unexpected status {status}")]
    UnexpectedStatus {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("tus response is missing the upload-offset header")]
    MissingOffset,

    #[error("tus upload-offset {0:?} is not an integer")]
    MalformedOffset(String),

    #[error("tus upload-offset {0} is negative")]
    InvalidOffset(i64),

    #[error("server holds {offset} bytes but the local source has {length}: not the same file")]
    ContentMismatch { offset: u64, length: u64 },

    #[error("checksum mismatch for {path}: local {local}, remote {remote}")]
    ChecksumMismatch {
        path: String,
        local: String,
        remote: String,
    },

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid auth token")]
    InvalidToken,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Wraps `err` as a resumable failure.
    pub fn resumable(err: impl Into<BoxError>) -> Self {
        Self::Resumable(err.into())
    }

    /// Returns `true` if the caller should retry the upload from the top.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Resumable(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if is_stream_termination(&err) {
            Self::Resumable(Box::new(err))
        } else {
            Self::Http(err)
        }
    }
}

/// Walks the source chain looking for a connection that ended early.
fn is_stream_termination(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        {
            return true;
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>()
            && hyper_err.is_incomplete_message()
        {
            return true;
        }
        current = e.source();
    }
    false
}
