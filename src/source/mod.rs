//! Source resolution: classifying URLs, fetching and caching decoded sources.
//!
//! A *source* is the full decoded image a crop is taken from: either a still
//! image downloaded from its URL, or a video frame obtained from a capture
//! backend at a given millisecond offset.
//!
//! # Example
//!
//! ```ignore
//! use roi_streamer::io::HttpFetcher;
//! use roi_streamer::source::{SourceCache, SourceKey, SourceKind, SourceRegistry};
//! use std::sync::Arc;
//!
//! let remote = Arc::new(HttpFetcher::new(std::time::Duration::from_secs(30))?);
//! let registry = SourceRegistry::new(SourceCache::new(), remote, None);
//!
//! let key = SourceKey::image("https://example.com/photo.png");
//! let image = registry.resolve(&key, SourceKind::Image).await?;
//! ```

mod cache;
mod classify;
mod fetcher;
mod registry;

pub use cache::{decoded_size, SourceCache, SourceKey, DEFAULT_SOURCE_CACHE_CAPACITY};
pub use classify::{is_valid_url, is_video, SourceKind, VIDEO_EXTENSIONS};
pub use fetcher::{ImageFetcher, SourceFetcher, VideoFrameFetcher};
pub use registry::SourceRegistry;
