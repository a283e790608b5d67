//! Test utilities for integration tests.
//!
//! This module provides mock source backends that count calls, helpers for
//! generating test rasters, and a harness wiring a [`CropService`] to a
//! temporary crop cache directory.

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use roi_streamer::error::IoError;
use roi_streamer::io::{FrameCapture, RemoteFetch};
use roi_streamer::roi::{CropService, RoiCache, RoiCacheConfig};
use roi_streamer::source::{SourceCache, SourceRegistry};
use roi_streamer::{create_router, RouterConfig};

// =============================================================================
// Rasters
// =============================================================================

/// Encode an RGB image where each pixel is `(x, y, 7)`, so crops can be
/// checked pixel by pixel.
pub fn gradient_png(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// Encode a solid-color image in the given format.
pub fn solid_image(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Bytes {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    encode(DynamicImage::ImageRgb8(img), format)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    Bytes::from(out.into_inner())
}

/// Decode PNG response bytes.
pub fn decode_png(data: &[u8]) -> RgbImage {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .unwrap()
        .to_rgb8()
}

/// Check if data starts with the PNG signature.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

// =============================================================================
// Mock Remote Source
// =============================================================================

/// In-memory [`RemoteFetch`] serving canned responses by URL.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Default)]
pub struct MockRemote {
    responses: Mutex<HashMap<String, Result<Bytes, IoError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_body(self, url: &str, body: Bytes) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body));
        self
    }

    pub fn with_error(self, url: &str, error: IoError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetch for MockRemote {
    async fn get(&self, url: &str) -> Result<Bytes, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().unwrap().get(url).cloned();
        response.unwrap_or_else(|| {
            Err(IoError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}

// =============================================================================
// Mock Frame Capture
// =============================================================================

/// [`FrameCapture`] returning a distinct solid frame per timestamp and
/// recording every request.
#[derive(Default)]
pub struct MockCapture {
    requests: Mutex<Vec<(String, u64)>>,
    delay: Option<Duration>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Red channel of the frame served for `timestamp_ms`.
    pub fn frame_red(timestamp_ms: u64) -> u8 {
        (timestamp_ms / 100 % 256) as u8
    }
}

#[async_trait]
impl FrameCapture for MockCapture {
    async fn capture_frame(&self, video_url: &str, timestamp_ms: u64) -> Result<Bytes, IoError> {
        self.requests
            .lock()
            .unwrap()
            .push((video_url.to_string(), timestamp_ms));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(solid_image(
            64,
            48,
            [Self::frame_red(timestamp_ms), 0, 0],
            ImageFormat::Png,
        ))
    }

    fn identifier(&self) -> &str {
        "mock-capture"
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A crop service over mocks and a temporary crop cache directory.
///
/// The directory lives as long as the harness.
pub struct TestHarness {
    pub dir: TempDir,
    pub remote: Arc<MockRemote>,
    pub capture: Option<Arc<MockCapture>>,
    pub service: Arc<CropService>,
}

impl TestHarness {
    pub fn new(remote: MockRemote, capture: Option<MockCapture>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir, remote, capture)
    }

    /// Build a harness over an existing cache directory.
    pub fn in_dir(dir: TempDir, remote: MockRemote, capture: Option<MockCapture>) -> Self {
        let remote = Arc::new(remote);
        let capture = capture.map(Arc::new);
        let service = build_service(&dir, remote.clone(), capture.clone());

        Self {
            dir,
            remote,
            capture,
            service,
        }
    }

    /// Router with admin routes enabled.
    pub fn router(&self) -> Router {
        self.router_with(RouterConfig::new().with_admin(true).with_tracing(false))
    }

    pub fn router_with(&self, config: RouterConfig) -> Router {
        create_router(self.service.clone(), config)
    }

    pub fn capture(&self) -> &MockCapture {
        self.capture.as_deref().unwrap()
    }
}

/// Wire a fresh service (empty source cache) to the crop cache in `dir`.
pub fn build_service(
    dir: &TempDir,
    remote: Arc<MockRemote>,
    capture: Option<Arc<MockCapture>>,
) -> Arc<CropService> {
    let roi_cache = RoiCache::open(RoiCacheConfig::new(dir.path())).unwrap();
    let capture = capture.map(|c| c as Arc<dyn FrameCapture>);
    let registry = SourceRegistry::new(SourceCache::new(), remote, capture);
    Arc::new(CropService::new(Arc::new(roi_cache), registry))
}

/// Build a `/crop` URI.
pub fn crop_uri(url: &str, left: i64, top: i64, right: i64, bottom: i64) -> String {
    format!(
        "/crop?url={}&left={}&top={}&right={}&bottom={}",
        url, left, top, right, bottom
    )
}
