//! Seam between the manager and the network.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use fbupload_client::{ClientError, Session, UploadOptions, join_remote_path, remote_file_name};

/// Future returned by [`ItemUploader::upload`].
pub type UploadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>>;

/// Uploads one local item into a remote destination directory.
///
/// Implementations must be safe to call again for the same item after a
/// resumable error.
pub trait ItemUploader: Send + Sync {
    fn upload<'a>(&'a self, destination: &'a str, local_path: &'a Path) -> UploadFuture<'a>;
}

/// [`ItemUploader`] backed by a logged-in [`Session`].
pub struct SessionUploader {
    session: Arc<Session>,
    options: UploadOptions,
    /// Remote paths already truncated in this run.
    truncated: Mutex<HashSet<String>>,
}

impl SessionUploader {
    pub fn new(session: Arc<Session>, options: UploadOptions) -> Self {
        Self {
            session,
            options,
            truncated: Mutex::new(HashSet::new()),
        }
    }

    /// With `overwrite`, only the first create of a remote path in this run
    /// truncates; retries after that resume from the server offset.
    fn take_override(&self, remote_path: &str) -> bool {
        self.options.overwrite
            && self
                .truncated
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(remote_path.to_string())
    }
}

impl ItemUploader for SessionUploader {
    fn upload<'a>(&'a self, destination: &'a str, local_path: &'a Path) -> UploadFuture<'a> {
        Box::pin(async move {
            let remote_path = join_remote_path(destination, &remote_file_name(local_path)?);
            let options = UploadOptions {
                overwrite: self.take_override(&remote_path),
                ..self.options
            };
            self.session
                .upload_file(destination, local_path, &options)
                .await
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader(overwrite: bool) -> SessionUploader {
        let session = Session::with_token("http://127.0.0.1:9", "tok").unwrap();
        SessionUploader::new(
            Arc::new(session),
            UploadOptions {
                overwrite,
                verify_checksum: true,
            },
        )
    }

    #[test]
    fn overwrite_applies_once_per_path() {
        let up = uploader(true);
        assert!(up.take_override("/data/a.txt"));
        assert!(!up.take_override("/data/a.txt"));
        assert!(up.take_override("/data/b.txt"));
    }

    #[test]
    fn no_overwrite_never_truncates() {
        let up = uploader(false);
        assert!(!up.take_override("/data/a.txt"));
        assert!(!up.take_override("/data/a.txt"));
    }

    #[tokio::test]
    async fn path_without_file_name_fails_before_network() {
        let up = uploader(false);
        let err = up.upload("/data", Path::new("/")).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidPath(_)));
    }
}
