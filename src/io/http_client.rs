use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{FrameCapture, RemoteFetch};
use crate::error::IoError;

/// Default timeout for a single remote fetch: 30 seconds.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the capture service API key.
pub const CAPTURE_API_KEY_HEADER: &str = "X-API-Key";

/// Create an HTTP client configured for source fetches.
///
/// The timeout bounds the whole request (connect + headers + body).
pub fn create_http_client(timeout: Duration) -> Result<Client, IoError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("roi-streamer/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IoError::Connection(format!("failed to build HTTP client: {}", e)))
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> IoError {
    if err.is_timeout() {
        IoError::Timeout(url.to_string())
    } else {
        IoError::Connection(format!("{}: {}", url, err))
    }
}

async fn read_success_body(url: &str, response: reqwest::Response) -> Result<Bytes, IoError> {
    let status = response.status();
    if !status.is_success() {
        return Err(IoError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .bytes()
        .await
        .map_err(|e| map_reqwest_error(url, e))
}

// =============================================================================
// Direct image download
// =============================================================================

/// reqwest-backed implementation of [`RemoteFetch`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with its own client and the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, IoError> {
        Ok(Self {
            client: create_http_client(timeout)?,
        })
    }

    /// Create a fetcher sharing an existing client (and its connection pool).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, IoError> {
        debug!(url = url, "GET source");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        read_success_body(url, response).await
    }
}

// =============================================================================
// Frame capture service client
// =============================================================================

/// HTTP client for a remote frame capture service.
///
/// Frames are requested with
/// `GET {endpoint}/capture?url=<video_url>&ms=<timestamp_ms>`, sending the API
/// key (if any) in the `X-API-Key` header. The response body is the encoded
/// frame.
#[derive(Clone)]
pub struct HttpFrameCapture {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    identifier: String,
}

impl HttpFrameCapture {
    /// Create a capture client for the service rooted at `endpoint`.
    pub fn new(client: Client, mut endpoint: Url, api_key: Option<String>) -> Self {
        // Url::join replaces the last segment unless the base ends in '/'
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let identifier = endpoint.to_string();

        Self {
            client,
            endpoint,
            api_key,
            identifier,
        }
    }

    /// Build the request URL for one frame.
    pub fn capture_url(&self, video_url: &str, timestamp_ms: u64) -> Result<Url, IoError> {
        let mut url = self
            .endpoint
            .join("capture")
            .map_err(|e| IoError::Connection(format!("invalid capture endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("url", video_url)
            .append_pair("ms", &timestamp_ms.to_string());

        Ok(url)
    }
}

#[async_trait]
impl FrameCapture for HttpFrameCapture {
    async fn capture_frame(&self, video_url: &str, timestamp_ms: u64) -> Result<Bytes, IoError> {
        let url = self.capture_url(video_url, timestamp_ms)?;
        debug!(video_url = video_url, timestamp_ms, "capture frame");

        let mut request = self.client.get(url.clone());
        if let Some(ref key) = self.api_key {
            request = request.header(CAPTURE_API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(url.as_str(), e))?;

        read_success_body(url.as_str(), response).await
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
