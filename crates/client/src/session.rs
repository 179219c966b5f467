//! Authenticated File Browser session.
//!
//! Async HTTP client using `reqwest`. The login token is sent both as the
//! `X-Auth` header and as the `auth` cookie on every request.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::path::encode_remote_path;
use crate::types::{ChecksumResponse, LoginRequest, Resource};
use crate::{CHECKSUM_BODY_LIMIT, ClientError, DEFAULT_METADATA_TIMEOUT, INFO_BODY_LIMIT};

const LOGIN_BODY_LIMIT: usize = 1_000_000;

pub(crate) const RESOURCES_PREFIX: &str = "/api/resources";
pub(crate) const TUS_PREFIX: &str = "/api/tus";

/// A logged-in session against one File Browser host.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) http: reqwest::Client,
    base_url: String,
    pub(crate) metadata_timeout: Duration,
}

impl Session {
    /// Logs in with username and password and returns the session.
    pub async fn login(host: &str, username: &str, password: &str) -> Result<Self, ClientError> {
        debug!(host, username, "logging into file browser");

        let base_url = normalize_host(host)?;
        let resp = reqwest::Client::new()
            .post(format!("{base_url}/api/login"))
            .timeout(DEFAULT_METADATA_TIMEOUT)
            .json(&LoginRequest {
                username,
                password,
                recaptcha: "",
            })
            .send()
            .await?;
        expect_status(&resp, "POST", StatusCode::OK)?;

        let body = read_limited(resp, LOGIN_BODY_LIMIT).await?;
        let token = String::from_utf8(body).map_err(|_| ClientError::InvalidToken)?;

        Self::with_token(host, token.trim())
    }

    /// Builds a session from an existing token.
    pub fn with_token(host: &str, token: &str) -> Result<Self, ClientError> {
        let base_url = normalize_host(host)?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(token).map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert("X-Auth", auth);
        let mut cookie =
            HeaderValue::from_str(&format!("auth={token}")).map_err(|_| ClientError::InvalidToken)?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
        })
    }

    /// Overrides the deadline applied to metadata calls.
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Host the session talks to, without a trailing slash.
    pub fn host(&self) -> &str {
        &self.base_url
    }

    /// Fetches resource metadata (a file, or a directory with its listing).
    pub async fn info(&self, path: &str) -> Result<Resource, ClientError> {
        debug!(path, "fetching resource info");

        let url = self.endpoint(RESOURCES_PREFIX, path)?;
        let resp = self
            .http
            .get(url)
            .timeout(self.metadata_timeout)
            .send()
            .await?;
        expect_status(&resp, "GET", StatusCode::OK)?;

        let body = read_limited(resp, INFO_BODY_LIMIT).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Asks the server for the hex SHA-256 of a remote file.
    pub async fn sha256(&self, path: &str) -> Result<String, ClientError> {
        debug!(path, "fetching remote sha256");

        let url = self.endpoint(RESOURCES_PREFIX, path)?;
        let resp = self
            .http
            .get(url)
            .query(&[("checksum", "sha256")])
            .timeout(self.metadata_timeout)
            .send()
            .await?;
        expect_status(&resp, "GET", StatusCode::OK)?;

        let body = read_limited(resp, CHECKSUM_BODY_LIMIT).await?;
        let parsed: ChecksumResponse = serde_json::from_slice(&body)?;
        Ok(parsed.checksums.sha256)
    }

    /// Absolute URL for `prefix` followed by the cleaned, encoded remote path.
    pub(crate) fn endpoint(&self, prefix: &str, remote_path: &str) -> Result<Url, ClientError> {
        let raw = format!("{}{}{}", self.base_url, prefix, encode_remote_path(remote_path));
        Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))
    }
}

fn normalize_host(host: &str) -> Result<String, ClientError> {
    let trimmed = host.trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| ClientError::InvalidUrl(format!("{host}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl(format!("{host}: unsupported scheme")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn expect_status(
    resp: &reqwest::Response,
    method: &'static str,
    expected: StatusCode,
) -> Result<(), ClientError> {
    if resp.status() != expected {
        return Err(ClientError::UnexpectedStatus {
            method,
            url: resp.url().to_string(),
            status: resp.status().as_u16(),
        });
    }
    Ok(())
}

/// Reads the whole body, failing once it grows past `limit` bytes.
async fn read_limited(mut resp: reqwest::Response, limit: usize) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(ClientError::BodyTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a mock HTTP server that answers one request with `status` and `body`,
    /// handing back the raw request it received.
    async fn mock_server(
        status: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let status = status.to_string();
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return String::new();
            };
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap_or(0);

            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        (url, handle)
    }

    /// Starts a mock server that reads one request and hangs up without answering.
    async fn hangup_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;
                drop(stream);
            }
        });

        (url, handle)
    }

    #[tokio::test]
    async fn login_returns_token_session() {
        let (url, handle) = mock_server("200 OK", "secret-token").await;

        let session = Session::login(&url, "admin", "hunter2").await.unwrap();
        assert_eq!(session.host(), url);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/login"));
    }

    #[tokio::test]
    async fn login_rejected() {
        let (url, handle) = mock_server("403 Forbidden", "").await;

        let err = Session::login(&url, "admin", "wrong").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus { status: 403, .. }));

        handle.abort();
    }

    #[tokio::test]
    async fn info_sends_auth_and_parses() {
        let json = r#"{"path":"/data/a.txt","name":"a.txt","size":12,"isDir":false}"#;
        let (url, handle) = mock_server("200 OK", json).await;

        let session = Session::with_token(&url, "tok").unwrap();
        let res = session.info("/data//a.txt").await.unwrap();
        assert_eq!(res.name, "a.txt");
        assert_eq!(res.size, 12);

        let request = handle.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/resources/data/a.txt"));
        assert!(request.contains("x-auth: tok"));
        assert!(request.contains("cookie: auth=tok"));
    }

    #[tokio::test]
    async fn info_non_200_is_error() {
        let (url, handle) = mock_server("404 Not Found", "").await;

        let session = Session::with_token(&url, "tok").unwrap();
        let err = session.info("/missing").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus { status: 404, .. }));

        handle.abort();
    }

    #[tokio::test]
    async fn checksum_body_is_limited() {
        let huge = format!(r#"{{"checksums":{{"sha256":"{}"}}}}"#, "a".repeat(CHECKSUM_BODY_LIMIT));
        let (url, handle) = mock_server("200 OK", &huge).await;

        let session = Session::with_token(&url, "tok").unwrap();
        let err = session.sha256("/data/a.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::BodyTooLarge { limit } if limit == CHECKSUM_BODY_LIMIT));

        handle.abort();
    }

    #[tokio::test]
    async fn checksum_query_is_sent() {
        let (url, handle) =
            mock_server("200 OK", r#"{"checksums":{"sha256":"abc123"}}"#).await;

        let session = Session::with_token(&url, "tok").unwrap();
        assert_eq!(session.sha256("/data/a.txt").await.unwrap(), "abc123");

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/resources/data/a.txt?checksum=sha256"));
    }

    #[tokio::test]
    async fn hangup_is_resumable() {
        let (url, handle) = hangup_server().await;

        let session = Session::with_token(&url, "tok").unwrap();
        let err = session.info("/data").await.unwrap_err();
        assert!(err.is_resumable(), "expected resumable error, got {err:?}");

        handle.abort();
    }

    #[test]
    fn invalid_host_rejected() {
        assert!(matches!(
            Session::with_token("not a url", "tok"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            Session::with_token("ftp://example.com", "tok"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn endpoint_encodes_segments() {
        let session = Session::with_token("http://example.com/fb/", "tok").unwrap();
        let url = session.endpoint(TUS_PREFIX, "/my docs//x.txt").unwrap();
        assert_eq!(url.as_str(), "http://example.com/fb/api/tus/my%20docs/x.txt");
    }
}
