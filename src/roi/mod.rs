//! ROI generation: cropping, PNG encoding, and the persisted crop cache.
//!
//! This module provides:
//! - [`CropService`]: main orchestrator for crop requests
//! - [`RoiCache`]: persisted, TTL- and size-bounded cache of encoded crops
//! - [`PngRoiEncoder`]: crop + PNG encoding
//! - [`BlockingCropService`]: synchronous entry point into the same pipeline
//!
//! # Example
//!
//! ```ignore
//! use roi_streamer::roi::{CropRequest, CropService};
//!
//! let request = CropRequest::new("https://example.com/clip.mp4", 0, 0, 320, 180)
//!     .with_timestamp(1500);
//! let crop = service.generate_crop(&request).await?;
//! ```

mod blocking;
mod cache;
mod encoder;
mod service;

pub use blocking::BlockingCropService;
pub use cache::{
    Clock, RoiCache, RoiCacheConfig, RoiKey, SystemClock, DEFAULT_ROI_CACHE_CAPACITY,
    ENTRY_HEADER_LEN, ENTRY_MAGIC,
};
pub use encoder::{decode_source, CropBox, PngRoiEncoder};
pub use service::{CacheStats, CacheStatus, CachedRoi, CropRequest, CropService};
