//! Source fetchers.
//!
//! A fetcher turns a [`SourceKey`] into a decoded image. There are two:
//! [`ImageFetcher`] downloads the URL and decodes the body, while
//! [`VideoFrameFetcher`] hands `(url, timestamp)` to a frame capture backend
//! and decodes the returned frame.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::info;

use crate::error::CropError;
use crate::io::{FrameCapture, RemoteFetch};
use crate::roi::decode_source;

use super::SourceKey;

// =============================================================================
// SourceFetcher Trait
// =============================================================================

/// Trait for producing decoded source images.
///
/// Fetchers perform no caching of their own; the
/// [`SourceRegistry`](super::SourceRegistry) sits in front of them.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch and decode the source identified by `key`.
    ///
    /// # Errors
    ///
    /// - [`CropError::Fetch`] if the remote cannot be reached or answers with
    ///   a non-success status
    /// - [`CropError::Decode`] if the bytes are not a decodable image
    async fn fetch_source(&self, key: &SourceKey) -> Result<DynamicImage, CropError>;

    /// Check that the fetcher is able to serve requests at all.
    ///
    /// Called before any cache lookup or remote call.
    fn ensure_ready(&self) -> Result<(), CropError> {
        Ok(())
    }

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Direct image download
// =============================================================================

/// Fetches still images over HTTP.
pub struct ImageFetcher {
    remote: Arc<dyn RemoteFetch>,
}

impl ImageFetcher {
    /// Create a fetcher using the given transport.
    pub fn new(remote: Arc<dyn RemoteFetch>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl SourceFetcher for ImageFetcher {
    async fn fetch_source(&self, key: &SourceKey) -> Result<DynamicImage, CropError> {
        info!(url = %key.url, "Fetching source image");
        let bytes = self.remote.get(&key.url).await?;
        decode_source(&bytes)
    }

    fn name(&self) -> &'static str {
        "image"
    }
}

// =============================================================================
// Video frame capture
// =============================================================================

/// Fetches video frames through a [`FrameCapture`] backend.
///
/// Without a backend every request fails with
/// [`CropError::CaptureNotConfigured`].
pub struct VideoFrameFetcher {
    capture: Option<Arc<dyn FrameCapture>>,
}

impl VideoFrameFetcher {
    /// Create a fetcher, optionally backed by a capture service.
    pub fn new(capture: Option<Arc<dyn FrameCapture>>) -> Self {
        Self { capture }
    }

    /// Returns `true` if a capture backend is configured.
    pub fn is_configured(&self) -> bool {
        self.capture.is_some()
    }
}

#[async_trait]
impl SourceFetcher for VideoFrameFetcher {
    async fn fetch_source(&self, key: &SourceKey) -> Result<DynamicImage, CropError> {
        let capture = self
            .capture
            .as_ref()
            .ok_or(CropError::CaptureNotConfigured)?;

        info!(
            url = %key.url,
            timestamp_ms = key.timestamp_ms,
            backend = capture.identifier(),
            "Capturing video frame"
        );
        let bytes = capture.capture_frame(&key.url, key.timestamp_ms).await?;
        decode_source(&bytes)
    }

    fn ensure_ready(&self) -> Result<(), CropError> {
        if self.capture.is_some() {
            Ok(())
        } else {
            Err(CropError::CaptureNotConfigured)
        }
    }

    fn name(&self) -> &'static str {
        "video_frame"
    }
}
