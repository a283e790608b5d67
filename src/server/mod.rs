//! HTTP server layer for ROI Streamer.
//!
//! This module provides the HTTP API for serving crops of remote images and
//! video frames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /crop?url=..&left=..&top=..&right=..&bottom=..&ms=..    │
//! │                                                                 │
//! │      ┌──────────────────────┐    ┌──────────────────────┐       │
//! │      │      handlers        │    │        routes        │       │
//! │      │ (params, responses)  │    │ (router, CORS, trace)│       │
//! │      └──────────────────────┘    └──────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    cache_stats_handler, clear_cache_handler, crop_handler, health_handler, status_for, AppState,
    CropQueryParams, ErrorResponse, HealthResponse, APPLICATION_NAME, CACHE_STATUS_HEADER,
};
pub use routes::{create_router, RouterConfig};
