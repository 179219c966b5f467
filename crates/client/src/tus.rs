//! Resumable uploads over File Browser's TUS endpoint.
//!
//! Each attempt runs create, then head, then (if bytes are missing) a
//! single PATCH carrying everything from the server's offset to the end.
//! Retrying an attempt after a resumable error is always safe: head
//! reports how far the server got.

use std::io::SeekFrom;
use std::path::Path;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::checksum::{file_prefix_sha256, file_sha256};
use crate::path::{join_remote_path, remote_file_name};
use crate::session::{TUS_PREFIX, expect_status};
use crate::types::{UploadOptions, UploadOutcome};
use crate::{ClientError, Session, TUS_VERSION};

const TUS_RESUMABLE: &str = "Tus-Resumable";
const UPLOAD_OFFSET: &str = "upload-offset";
const OFFSET_CONTENT_TYPE: &str = "application/offset+octet-stream";

impl Session {
    /// Creates (or touches) the remote file. `override_existing` truncates it.
    pub async fn create_file(
        &self,
        remote_path: &str,
        override_existing: bool,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(TUS_PREFIX, remote_path)?;
        let resp = self
            .http
            .post(url)
            .query(&[("override", override_existing)])
            .timeout(self.metadata_timeout)
            .send()
            .await?;
        expect_status(&resp, "POST", StatusCode::CREATED)
    }

    /// Returns how many bytes of `remote_path` the server already holds.
    pub async fn head_offset(&self, remote_path: &str) -> Result<u64, ClientError> {
        let url = self.endpoint(TUS_PREFIX, remote_path)?;
        let resp = self
            .http
            .head(url)
            .header(TUS_RESUMABLE, TUS_VERSION)
            .timeout(self.metadata_timeout)
            .send()
            .await?;
        expect_status(&resp, "HEAD", StatusCode::OK)?;
        parse_offset(resp.headers())
    }

    async fn patch(
        &self,
        remote_path: &str,
        offset: u64,
        remaining: u64,
        body: reqwest::Body,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(TUS_PREFIX, remote_path)?;
        let resp = self
            .http
            .patch(url)
            .header(TUS_RESUMABLE, TUS_VERSION)
            .header(CONTENT_TYPE, OFFSET_CONTENT_TYPE)
            .header("Upload-Offset", offset)
            .header(CONTENT_LENGTH, remaining)
            .body(body)
            .send()
            .await?;
        expect_status(&resp, "PATCH", StatusCode::NO_CONTENT)
    }

    /// Uploads `length` bytes from `reader` to `destination/filename`,
    /// resuming from whatever offset the server reports.
    pub async fn upload_reader<R>(
        &self,
        destination: &str,
        filename: &str,
        reader: R,
        length: u64,
        override_existing: bool,
    ) -> Result<UploadOutcome, ClientError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
    {
        let remote_path = join_remote_path(destination, filename);
        let offset = self.create_and_head(&remote_path, override_existing).await?;
        self.send_remaining(&remote_path, reader, offset, length).await
    }

    /// Uploads a local file into the remote `destination` directory.
    ///
    /// With `verify_checksum`, a remote file whose content differs from the
    /// local one is a [`ClientError::ChecksumMismatch`] and is left as it is.
    /// A partial remote file is checked against the matching local prefix
    /// before anything is appended to it. Only with `overwrite` is a
    /// differing file replaced, once; a second mismatch is an error too.
    pub async fn upload_file(
        &self,
        destination: &str,
        local_path: &Path,
        options: &UploadOptions,
    ) -> Result<UploadOutcome, ClientError> {
        let filename = remote_file_name(local_path)?;
        let remote_path = join_remote_path(destination, &filename);
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();

        let offset = self.create_and_head(&remote_path, options.overwrite).await?;
        if options.verify_checksum && !options.overwrite && offset > 0 && offset < length {
            self.verify(&remote_path, local_path, Some(offset)).await?;
        }
        let outcome = self
            .send_remaining(&remote_path, file, offset, length)
            .await?;
        if !options.verify_checksum {
            return Ok(outcome);
        }

        match self.verify(&remote_path, local_path, None).await {
            Ok(()) => {
                info!(path = %remote_path, "upload verified");
                Ok(outcome)
            }
            Err(ClientError::ChecksumMismatch { .. }) if options.overwrite => {
                warn!(path = %remote_path, "remote content differs, replacing");
                let file = tokio::fs::File::open(local_path).await?;
                let offset = self.create_and_head(&remote_path, true).await?;
                let outcome = self
                    .send_remaining(&remote_path, file, offset, length)
                    .await?;
                self.verify(&remote_path, local_path, None).await?;
                info!(path = %remote_path, "upload verified after replace");
                Ok(outcome)
            }
            Err(err) => Err(err),
        }
    }

    async fn create_and_head(
        &self,
        remote_path: &str,
        override_existing: bool,
    ) -> Result<u64, ClientError> {
        self.create_file(remote_path, override_existing).await?;
        self.head_offset(remote_path).await
    }

    async fn send_remaining<R>(
        &self,
        remote_path: &str,
        mut reader: R,
        offset: u64,
        length: u64,
    ) -> Result<UploadOutcome, ClientError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
    {
        if offset == length {
            debug!(path = %remote_path, length, "remote already complete");
            return Ok(UploadOutcome::AlreadyComplete);
        }
        if offset > length {
            return Err(ClientError::ContentMismatch { offset, length });
        }

        let remaining = length - offset;
        reader.seek(SeekFrom::Start(offset)).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader.take(remaining)));

        debug!(path = %remote_path, offset, remaining, "patching");
        self.patch(remote_path, offset, remaining, body).await?;

        Ok(UploadOutcome::Uploaded {
            offset,
            bytes: remaining,
        })
    }

    /// Compares the server's digest of `remote_path` with the local file,
    /// or with its first `prefix` bytes.
    async fn verify(
        &self,
        remote_path: &str,
        local_path: &Path,
        prefix: Option<u64>,
    ) -> Result<(), ClientError> {
        let local = local_sha256(local_path, prefix).await?;
        let remote = self.sha256(remote_path).await?;
        if remote.eq_ignore_ascii_case(&local) {
            return Ok(());
        }
        warn!(
            path = %remote_path,
            local = %local,
            remote = %remote,
            "remote file differs from local file"
        );
        Err(ClientError::ChecksumMismatch {
            path: remote_path.to_string(),
            local,
            remote,
        })
    }
}

async fn local_sha256(path: &Path, prefix: Option<u64>) -> Result<String, ClientError> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || match prefix {
        Some(len) => file_prefix_sha256(&path, len),
        None => file_sha256(&path),
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(digest)
}

/// Parses the lower-case `upload-offset` response header.
fn parse_offset(headers: &HeaderMap) -> Result<u64, ClientError> {
    let value = headers.get(UPLOAD_OFFSET).ok_or(ClientError::MissingOffset)?;
    let text = value
        .to_str()
        .map_err(|_| ClientError::MalformedOffset(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
    let parsed: i64 = text
        .trim()
        .parse()
        .map_err(|_| ClientError::MalformedOffset(text.to_string()))?;
    u64::try_from(parsed).map_err(|_| ClientError::InvalidOffset(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(UPLOAD_OFFSET, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn offset_parses() {
        assert_eq!(parse_offset(&headers_with("0")).unwrap(), 0);
        assert_eq!(parse_offset(&headers_with("1048576")).unwrap(), 1_048_576);
    }

    #[test]
    fn offset_missing() {
        assert!(matches!(
            parse_offset(&HeaderMap::new()),
            Err(ClientError::MissingOffset)
        ));
    }

    #[test]
    fn offset_negative() {
        assert!(matches!(
            parse_offset(&headers_with("-1")),
            Err(ClientError::InvalidOffset(-1))
        ));
    }

    #[test]
    fn offset_not_a_number() {
        assert!(matches!(
            parse_offset(&headers_with("twelve")),
            Err(ClientError::MalformedOffset(s)) if s == "twelve"
        ));
    }

    #[test]
    fn offset_header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Upload-Offset", HeaderValue::from_static("7"));
        assert_eq!(parse_offset(&headers).unwrap(), 7);
    }

    #[tokio::test]
    async fn local_digest_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"Hello World!").unwrap();

        assert_eq!(
            local_sha256(&path, None).await.unwrap(),
            "7f83b1657ff1fc53b92dc18148a1d65dfc2d4b1fa3d677284addd200126d9069"
        );
        assert_eq!(
            local_sha256(&path, Some(5)).await.unwrap(),
            crate::sha256_hex(b"Hello")
        );
    }
}
