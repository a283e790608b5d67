//! In-memory cache of decoded source images.
//!
//! Decoding is the expensive part of serving a crop, so every decoded source
//! (a downloaded image or a captured video frame) is kept here and shared by
//! all crops taken from it.
//!
//! # Cache Key
//!
//! Sources are keyed by `(url, timestamp_ms)`. Still images always use
//! `timestamp_ms = 0`, so every crop of the same image shares one entry.
//!
//! # Size-Based Eviction
//!
//! Each entry is weighted by its decoded size (`width * height *
//! bytes_per_pixel`). When the total weight exceeds capacity the
//! least-recently-used entries are evicted until it fits again. An entry
//! heavier than the whole budget is evicted immediately.

use std::sync::{Arc, Mutex, MutexGuard};

use image::DynamicImage;
use lru::LruCache;

/// Default cache capacity: 100MB of decoded pixels
pub const DEFAULT_SOURCE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of a decoded source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// Source URL as given by the client
    pub url: Arc<str>,

    /// Frame offset in milliseconds (0 for still images)
    pub timestamp_ms: u64,
}

impl SourceKey {
    /// Create a key for `url` at `timestamp_ms`.
    pub fn new(url: impl Into<Arc<str>>, timestamp_ms: u64) -> Self {
        Self {
            url: url.into(),
            timestamp_ms,
        }
    }

    /// Key for a still image.
    pub fn image(url: impl Into<Arc<str>>) -> Self {
        Self::new(url, 0)
    }

    /// Key for a video frame at `timestamp_ms`.
    pub fn video_frame(url: impl Into<Arc<str>>, timestamp_ms: u64) -> Self {
        Self::new(url, timestamp_ms)
    }
}

/// Decoded size of an image in bytes.
pub fn decoded_size(image: &DynamicImage) -> usize {
    image.width() as usize * image.height() as usize * image.color().bytes_per_pixel() as usize
}

// =============================================================================
// Source Cache
// =============================================================================

struct Inner {
    entries: LruCache<SourceKey, Arc<DynamicImage>>,
    current_size: usize,
}

/// Weighted LRU cache for decoded source images.
///
/// Callers receive `Arc` handles, so an entry evicted while a crop is using
/// it stays alive until that crop finishes.
///
/// # Thread Safety
///
/// All operations take a short internal lock and never suspend, so the cache
/// can be used from async tasks and blocking threads alike.
///
/// # Example
///
/// ```
/// use roi_streamer::source::{SourceCache, SourceKey};
/// use image::{DynamicImage, RgbImage};
/// use std::sync::Arc;
///
/// let cache = SourceCache::with_capacity(1024 * 1024);
/// let key = SourceKey::image("https://example.com/photo.png");
///
/// cache.put(key.clone(), Arc::new(DynamicImage::ImageRgb8(RgbImage::new(10, 10))));
///
/// assert!(cache.contains(&key));
/// assert_eq!(cache.size(), 10 * 10 * 3);
/// ```
pub struct SourceCache {
    inner: Mutex<Inner>,

    /// Maximum total decoded size in bytes
    max_size: usize,
}

impl SourceCache {
    /// Create a new source cache with default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SOURCE_CACHE_CAPACITY)
    }

    /// Create a new source cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_size: 0,
            }),
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a source from the cache, marking it as recently used.
    pub fn get(&self, key: &SourceKey) -> Option<Arc<DynamicImage>> {
        self.lock().entries.get(key).cloned()
    }

    /// Check if a source is cached without updating LRU order.
    pub fn contains(&self, key: &SourceKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Store a decoded source.
    ///
    /// Replaces any existing entry for the key, then evicts
    /// least-recently-used entries until the cache is within capacity.
    pub fn put(&self, key: SourceKey, image: Arc<DynamicImage>) {
        let weight = decoded_size(&image);
        let mut inner = self.lock();

        if let Some(old) = inner.entries.put(key, image) {
            inner.current_size = inner.current_size.saturating_sub(decoded_size(&old));
        }
        inner.current_size += weight;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(decoded_size(&evicted));
                }
                None => break,
            }
        }
    }

    /// Remove a source from the cache.
    ///
    /// Returns the removed image if it was present.
    pub fn remove(&self, key: &SourceKey) -> Option<Arc<DynamicImage>> {
        let mut inner = self.lock();
        let removed = inner.entries.pop(key)?;
        inner.current_size = inner.current_size.saturating_sub(decoded_size(&removed));
        Some(removed)
    }

    /// Clear all cached sources.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.current_size = 0;
    }

    /// Get the current total decoded size in bytes.
    pub fn size(&self) -> usize {
        self.lock().current_size
    }

    /// Get the number of cached sources.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for SourceCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
