use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for downloading a whole resource by URL.
///
/// This is the seam between the image fetcher and the network: production
/// code uses [`HttpFetcher`](super::HttpFetcher), tests plug in mocks that
/// serve canned bytes and count calls. Implementations must be thread-safe.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// GET `url` and return the response body.
    ///
    /// Returns [`IoError::Status`] for non-success responses and
    /// [`IoError::Connection`] / [`IoError::Timeout`] for transport failures.
    async fn get(&self, url: &str) -> Result<Bytes, IoError>;
}

/// Trait for the external video frame capture capability.
///
/// Given a video URL and a millisecond offset, a capture service returns the
/// frame at that offset as encoded raster bytes (PNG, JPEG, ...).
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// Capture the frame of `video_url` at `timestamp_ms`.
    async fn capture_frame(&self, video_url: &str, timestamp_ms: u64) -> Result<Bytes, IoError>;

    /// Identifier of the capture backend (for logging).
    fn identifier(&self) -> &str;
}
