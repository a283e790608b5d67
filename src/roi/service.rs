//! Crop Service for orchestrating ROI generation.
//!
//! The CropService is the main entry point for crop requests. It orchestrates:
//! - Request validation
//! - ROI cache lookups
//! - Source resolution via the registry
//! - Cropping and PNG encoding
//! - Result caching
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           CropService                            │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                     generate_crop()                        │  │
//! │  │  1. Validate request    4. Crop to box                     │  │
//! │  │  2. Check ROI cache     5. Encode PNG                      │  │
//! │  │  3. Resolve source      6. Store & return                  │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │           │                     │                     │          │
//! │           ▼                     ▼                     ▼          │
//! │     ┌──────────┐       ┌────────────────┐     ┌───────────────┐  │
//! │     │ RoiCache │       │ SourceRegistry │     │ PngRoiEncoder │  │
//! │     └──────────┘       └────────────────┘     └───────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only suspension point is source resolution. Everything after it runs
//! without yielding, so a request cancelled at any point either stored a
//! complete crop or stored nothing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CropError;
use crate::source::{is_valid_url, SourceKey, SourceKind, SourceRegistry};

use super::cache::{RoiCache, RoiKey};
use super::encoder::{CropBox, PngRoiEncoder};

// =============================================================================
// Crop Request
// =============================================================================

/// A request for one crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRequest {
    /// Image or video URL
    pub url: String,

    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,

    /// Frame offset in milliseconds (ignored for still images)
    pub timestamp_ms: i64,
}

impl CropRequest {
    /// Create a new crop request at timestamp 0.
    pub fn new(url: impl Into<String>, left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            url: url.into(),
            left,
            top,
            right,
            bottom,
            timestamp_ms: 0,
        }
    }

    /// Set the frame timestamp.
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// The requested crop box.
    pub fn crop_box(&self) -> CropBox {
        CropBox::new(self.left, self.top, self.right, self.bottom)
    }
}

// =============================================================================
// Crop Response
// =============================================================================

/// Whether a crop was served from the ROI cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    /// Header value: `HIT` or `MISS`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Response from the crop service.
#[derive(Debug, Clone)]
pub struct CachedRoi {
    /// PNG-encoded crop
    pub data: Bytes,

    /// Whether the crop came from the ROI cache
    pub cache_status: CacheStatus,
}

/// Occupancy of both cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub source_entries: usize,
    pub source_size: u64,
    pub source_capacity: u64,
    pub roi_entries: usize,
    pub roi_size: u64,
    pub roi_capacity: u64,
}

/// A validated request.
struct CropPlan {
    kind: SourceKind,
    crop: CropBox,
    source_key: SourceKey,
    roi_key: RoiKey,
}

// =============================================================================
// Crop Service
// =============================================================================

/// Service for generating and caching crops.
///
/// # Example
///
/// ```ignore
/// use roi_streamer::roi::{CropRequest, CropService, RoiCache, RoiCacheConfig};
/// use roi_streamer::source::{SourceCache, SourceRegistry};
///
/// let roi_cache = Arc::new(RoiCache::open(RoiCacheConfig::new("/tmp/roi"))?);
/// let sources = SourceRegistry::new(SourceCache::new(), remote, None);
/// let service = CropService::new(roi_cache, sources);
///
/// let request = CropRequest::new("https://example.com/photo.png", 10, 10, 100, 100);
/// let crop = service.generate_crop(&request).await?;
///
/// println!("{} bytes, {}", crop.data.len(), crop.cache_status.as_str());
/// ```
pub struct CropService {
    /// Persisted cache of encoded crops
    roi_cache: Arc<RoiCache>,

    /// Decoded sources and their fetchers
    sources: SourceRegistry,

    /// PNG encoder
    encoder: PngRoiEncoder,
}

impl CropService {
    /// Create a new crop service.
    pub fn new(roi_cache: Arc<RoiCache>, sources: SourceRegistry) -> Self {
        Self {
            roi_cache,
            sources,
            encoder: PngRoiEncoder::new(),
        }
    }

    /// Validate a request and derive its cache keys.
    fn plan(&self, request: &CropRequest) -> Result<CropPlan, CropError> {
        if !is_valid_url(&request.url) {
            return Err(CropError::invalid(format!(
                "'{}' is not an absolute URL with a host",
                request.url
            )));
        }

        let crop = request.crop_box();
        crop.validate()?;

        let kind = SourceKind::of(&request.url);
        let timestamp_ms = match kind {
            SourceKind::Image => 0,
            SourceKind::VideoFrame => u64::try_from(request.timestamp_ms).map_err(|_| {
                CropError::invalid(format!(
                    "timestamp must be non-negative, got {}",
                    request.timestamp_ms
                ))
            })?,
        };

        self.sources.ensure_ready(kind)?;

        let source_key = SourceKey::new(request.url.as_str(), timestamp_ms);
        let roi_key = RoiKey::new(request.url.as_str(), timestamp_ms, &crop);

        Ok(CropPlan {
            kind,
            crop,
            source_key,
            roi_key,
        })
    }

    /// Get a crop, using the caches when available.
    ///
    /// # Errors
    ///
    /// - [`CropError::InvalidRequest`] for a malformed URL, an inverted box, a
    ///   negative video timestamp, or a box entirely outside the source
    /// - [`CropError::CaptureNotConfigured`] for a video URL without a capture
    ///   backend
    /// - [`CropError::Fetch`] / [`CropError::Decode`] from source resolution
    pub async fn generate_crop(&self, request: &CropRequest) -> Result<CachedRoi, CropError> {
        let plan = self.plan(request)?;

        // Check ROI cache first
        if let Some(data) = self.roi_cache.get(&plan.roi_key) {
            debug!(url = %request.url, "ROI cache hit");
            return Ok(CachedRoi {
                data,
                cache_status: CacheStatus::Hit,
            });
        }

        // Cache miss - need to generate the crop
        let source = self.sources.resolve(&plan.source_key, plan.kind).await?;
        let data = self.encoder.crop_and_encode(&source, &plan.crop)?;

        if let Err(e) = self.roi_cache.set(&plan.roi_key, &data) {
            warn!(url = %request.url, error = %e, "Failed to store ROI");
        }

        Ok(CachedRoi {
            data,
            cache_status: CacheStatus::Miss,
        })
    }

    /// [`generate_crop`](Self::generate_crop) with a deadline.
    ///
    /// Returns [`CropError::Cancelled`] if the deadline passes first.
    pub async fn generate_crop_with_timeout(
        &self,
        request: &CropRequest,
        timeout: Duration,
    ) -> Result<CachedRoi, CropError> {
        match tokio::time::timeout(timeout, self.generate_crop(request)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url = %request.url, ?timeout, "Crop request timed out");
                Err(CropError::Cancelled)
            }
        }
    }

    /// [`generate_crop`](Self::generate_crop), abandoned when `cancel`
    /// completes first.
    ///
    /// Returns [`CropError::Cancelled`] on cancellation.
    pub async fn generate_crop_cancellable<C>(
        &self,
        request: &CropRequest,
        cancel: C,
    ) -> Result<CachedRoi, CropError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(url = %request.url, "Crop request cancelled");
                Err(CropError::Cancelled)
            }
            result = self.generate_crop(request) => result,
        }
    }

    /// Drop both cache tiers.
    pub fn clear_all(&self) -> Result<(), CropError> {
        self.sources.cache().clear();
        self.roi_cache.clear()?;
        Ok(())
    }

    /// Current occupancy of both cache tiers.
    pub fn cache_stats(&self) -> CacheStats {
        let sources = self.sources.cache();
        CacheStats {
            source_entries: sources.len(),
            source_size: sources.size() as u64,
            source_capacity: sources.capacity() as u64,
            roi_entries: self.roi_cache.len(),
            roi_size: self.roi_cache.size(),
            roi_capacity: self.roi_cache.capacity(),
        }
    }

    /// Get the ROI cache.
    pub fn roi_cache(&self) -> &Arc<RoiCache> {
        &self.roi_cache
    }

    /// Get the source registry.
    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }
}

// =============================================================================
// Tests
// =============================================================================
