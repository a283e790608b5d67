//! URL classification.
//!
//! Decides whether a source URL points at a video (served through frame
//! capture) or a still image (downloaded directly), and whether a URL is
//! syntactically usable at all. Both checks are pure string inspection; no
//! network I/O is performed.

use url::Url;

/// File extensions treated as video containers (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "webm", "mkv", "avi", "wmv", "flv", "mpg", "mpeg", "3gp", "3g2", "ogv",
    "ts", "m2ts", "mts", "f4v", "asf",
];

// =============================================================================
// SourceKind
// =============================================================================

/// How a source URL is turned into a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Downloaded and decoded directly
    Image,

    /// A frame captured from a video at a timestamp
    VideoFrame,
}

impl SourceKind {
    /// Classify a URL.
    pub fn of(url: &str) -> Self {
        if is_video(url) {
            SourceKind::VideoFrame
        } else {
            SourceKind::Image
        }
    }

    /// Name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::VideoFrame => "video_frame",
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Returns `true` if the URL's path ends in a known video extension.
///
/// The query string and fragment are ignored and the comparison is
/// case-insensitive. URLs without an extension, or with an unknown one, are
/// classified as images.
pub fn is_video(url: &str) -> bool {
    match path_extension(url) {
        Some(ext) => VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Returns `true` if the URL parses and carries both a scheme and a non-empty
/// host.
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Extract the extension of the last path segment.
fn path_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Unparseable input: strip query and fragment by hand
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_string())
}
