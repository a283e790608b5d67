use thiserror::Error;

/// I/O errors that can occur when reaching a remote image source or the
/// frame capture service.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The remote answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport gave up waiting for the remote
    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Errors raised by the persisted ROI cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("Cache I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// An entry file exists but its header cannot be parsed
    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl CacheError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        CacheError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors that can occur while producing a crop.
///
/// Every variant is local to one request. The HTTP layer maps them to status
/// codes; the pipeline itself never deals in protocol details.
#[derive(Debug, Clone, Error)]
pub enum CropError {
    /// Malformed URL, bad crop box or bad timestamp (should map to HTTP 400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A video frame was requested but no capture service is configured
    #[error("Video frame capture is not configured; set a capture endpoint to serve video URLs")]
    CaptureNotConfigured,

    /// Transport or HTTP-level failure reaching the source or capture service
    #[error("Fetch failed: {0}")]
    Fetch(#[from] IoError),

    /// Fetched bytes are not a decodable image
    #[error("Failed to decode source image: {message}")]
    Decode { message: String },

    /// The caller cancelled the request or its deadline passed
    #[error("Request cancelled before completion")]
    Cancelled,

    /// Anything not classified above
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<CacheError> for CropError {
    fn from(err: CacheError) -> Self {
        CropError::Unexpected(err.to_string())
    }
}

impl CropError {
    /// Shorthand for building an [`CropError::InvalidRequest`].
    pub fn invalid(message: impl Into<String>) -> Self {
        CropError::InvalidRequest(message.into())
    }

    /// Stable identifier used in JSON error bodies and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            CropError::InvalidRequest(_) => "invalid_request",
            CropError::CaptureNotConfigured => "capture_not_configured",
            CropError::Fetch(_) => "fetch_error",
            CropError::Decode { .. } => "decode_error",
            CropError::Cancelled => "cancelled",
            CropError::Unexpected(_) => "unexpected_error",
        }
    }
}
