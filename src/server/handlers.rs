//! HTTP request handlers for the ROI Streamer API.
//!
//! This module contains the Axum handlers for serving crops, health checks,
//! and cache administration.
//!
//! # Endpoints
//!
//! - `GET /crop?url=..&left=..&top=..&right=..&bottom=..&ms=..` - Serve a crop
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats` - Cache occupancy (admin)
//! - `POST /cache/clear` - Drop both cache tiers (admin)

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::CropError;
use crate::roi::{CacheStats, CropRequest, CropService};

/// Response header carrying the ROI cache status (`X-Cache`).
///
/// Kept lowercase so it is also a valid static `HeaderName`.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Name reported by the health endpoint.
pub const APPLICATION_NAME: &str = "roi-streamer";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the crop service.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The crop service for processing crop requests
    pub crop_service: Arc<CropService>,

    /// Cache-Control max-age in seconds for crop responses (defaults to 1 hour)
    pub cache_max_age: u32,

    /// Deadline for a single crop request; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl AppState {
    /// Create a new application state with the given crop service.
    pub fn new(crop_service: CropService) -> Self {
        Self::with_shared_service(Arc::new(crop_service))
    }

    /// Create a new application state sharing an existing service.
    pub fn with_shared_service(crop_service: Arc<CropService>) -> Self {
        Self {
            crop_service,
            cache_max_age: 3600,
            request_timeout: None,
        }
    }

    /// Set the Cache-Control max-age.
    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    /// Set a per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for crop requests.
///
/// Every field is taken as a raw string so that missing or malformed values
/// are reported as `invalid_request` JSON errors like every other
/// validation failure.
#[derive(Debug, Default, Deserialize)]
pub struct CropQueryParams {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub left: Option<String>,

    #[serde(default)]
    pub top: Option<String>,

    #[serde(default)]
    pub right: Option<String>,

    #[serde(default)]
    pub bottom: Option<String>,

    /// Frame timestamp in milliseconds (default 0)
    #[serde(default)]
    pub ms: Option<String>,
}

fn parse_int(name: &str, value: Option<&str>) -> Result<i64, CropError> {
    let value = value.ok_or_else(|| CropError::invalid(format!("missing parameter '{}'", name)))?;
    value
        .trim()
        .parse()
        .map_err(|_| CropError::invalid(format!("parameter '{}' must be an integer, got '{}'", name, value)))
}

impl CropQueryParams {
    /// Convert into a [`CropRequest`].
    pub fn into_request(self) -> Result<CropRequest, CropError> {
        let url = self
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CropError::invalid("missing parameter 'url'"))?;

        let left = parse_int("left", self.left.as_deref())?;
        let top = parse_int("top", self.top.as_deref())?;
        let right = parse_int("right", self.right.as_deref())?;
        let bottom = parse_int("bottom", self.bottom.as_deref())?;
        let ms = match self.ms.as_deref() {
            Some(raw) if !raw.is_empty() => parse_int("ms", Some(raw))?,
            _ => 0,
        };

        Ok(CropRequest::new(url, left, top, right, bottom).with_timestamp(ms))
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_request", "fetch_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Application name
    pub application: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// HTTP status for each error kind.
pub fn status_for(err: &CropError) -> StatusCode {
    match err {
        CropError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CropError::CaptureNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        CropError::Fetch(_) => StatusCode::BAD_GATEWAY,
        CropError::Decode { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        CropError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        CropError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert CropError to HTTP response.
///
/// 5xx errors are logged at ERROR level, 4xx at WARN.
impl IntoResponse for CropError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let error_type = self.kind();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle crop requests.
///
/// # Endpoint
///
/// `GET /crop`
///
/// # Query Parameters
///
/// - `url`: Absolute image or video URL
/// - `left`, `top`, `right`, `bottom`: Crop box in source pixels
/// - `ms`: Video frame offset in milliseconds (default: 0)
///
/// # Response
///
/// - `200 OK`: PNG crop with `Content-Type: image/png`
/// - `400 Bad Request`: Missing or malformed parameters
/// - `415 Unsupported Media Type`: Source is not a decodable image
/// - `500 Internal Server Error`: Capture not configured or unexpected error
/// - `502 Bad Gateway`: Source or capture service unreachable
/// - `504 Gateway Timeout`: Request deadline passed
///
/// # Headers
///
/// - `Content-Type: image/png`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Cache: HIT|MISS`
pub async fn crop_handler(
    State(state): State<AppState>,
    Query(query): Query<CropQueryParams>,
) -> Result<Response, CropError> {
    let request = query.into_request()?;

    let crop = match state.request_timeout {
        Some(timeout) => {
            state
                .crop_service
                .generate_crop_with_timeout(&request, timeout)
                .await?
        }
        None => state.crop_service.generate_crop(&request).await?,
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
        ],
        [(CACHE_STATUS_HEADER, crop.cache_status.as_str())],
        crop.data,
    )
        .into_response())
}

/// Handle health check requests.
///
/// `GET /health` returns `200 OK` with
/// `{"status": "healthy", "version": "0.1.0", "application": "roi-streamer"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        application: APPLICATION_NAME.to_string(),
    })
}

/// Report cache occupancy.
///
/// `GET /cache/stats`
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.crop_service.cache_stats())
}

/// Drop both cache tiers.
///
/// `POST /cache/clear` returns `204 No Content`.
pub async fn clear_cache_handler(State(state): State<AppState>) -> Result<StatusCode, CropError> {
    state.crop_service.clear_all()?;
    Ok(StatusCode::NO_CONTENT)
}
