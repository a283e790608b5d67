//! # ROI Streamer
//!
//! A region-of-interest server: crops rectangular regions out of remote
//! images and video frames and returns them as PNG.
//!
//! Decoded sources are kept in a size-bounded in-memory cache, and encoded
//! crops are persisted on disk with an optional TTL, so a repeated request is
//! served without touching the network.
//!
//! ## Features
//!
//! - **Two source kinds**: plain images are downloaded over HTTP; video frames
//!   are requested from an external frame capture service
//! - **Two cache tiers**: weighted LRU of decoded sources, plus a persisted
//!   crop cache that survives restarts
//! - **Request coalescing**: concurrent requests for one source share a fetch
//! - **Cancellation**: a request abandoned mid-flight leaves no crop behind
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - outbound HTTP: source download and frame capture
//! - [`source`] - URL classification, source fetchers, source cache and registry
//! - [`roi`] - crop encoding, persisted crop cache, and the crop pipeline
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use roi_streamer::{
//!     create_router, CropService, HttpFetcher, RoiCache, RoiCacheConfig, RouterConfig,
//!     SourceCache, SourceRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roi_cache = Arc::new(RoiCache::open(RoiCacheConfig::new("/tmp/roi_cache"))?);
//!     let remote = Arc::new(HttpFetcher::new(Duration::from_secs(30))?);
//!     let registry = SourceRegistry::new(SourceCache::new(), remote, None);
//!     let service = Arc::new(CropService::new(roi_cache, registry));
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod roi;
pub mod server;
pub mod source;

// Re-export commonly used types
pub use config::{CacheConfig, Cli, Command, ServeConfig};
pub use error::{CacheError, CropError, IoError};
pub use io::{
    create_http_client, FrameCapture, HttpFetcher, HttpFrameCapture, RemoteFetch,
    CAPTURE_API_KEY_HEADER, DEFAULT_FETCH_TIMEOUT,
};
pub use roi::{
    BlockingCropService, CacheStats, CacheStatus, CachedRoi, Clock, CropBox, CropRequest,
    CropService, PngRoiEncoder, RoiCache, RoiCacheConfig, RoiKey, SystemClock,
    DEFAULT_ROI_CACHE_CAPACITY,
};
pub use server::{
    cache_stats_handler, clear_cache_handler, create_router, crop_handler, health_handler,
    AppState, CropQueryParams, ErrorResponse, HealthResponse, RouterConfig,
};
pub use source::{
    is_valid_url, is_video, ImageFetcher, SourceCache, SourceFetcher, SourceKey, SourceKind,
    SourceRegistry, VideoFrameFetcher, DEFAULT_SOURCE_CACHE_CAPACITY,
};
