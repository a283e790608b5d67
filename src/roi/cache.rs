//! Persisted cache for encoded ROI crops.
//!
//! Each crop is stored as one file in the cache directory, named after the
//! SHA-256 digest of its [`RoiKey`]. Entries survive restarts, expire after an
//! optional TTL, and are evicted least-recently-used first when the directory
//! exceeds its byte budget.
//!
//! # Entry Format
//!
//! ```text
//! offset  size  field
//! 0       4     magic "ROI1"
//! 4       8     stored_at  (ms since UNIX epoch, u64 LE)
//! 12      8     expires_at (ms since UNIX epoch, u64 LE; u64::MAX = never)
//! 20      ...   PNG payload
//! ```
//!
//! # Durability
//!
//! Writes go to a temporary file in the cache directory which is then renamed
//! over the entry, so readers see either the old entry or the new one. On
//! open, leftover temporary files are removed and the index is rebuilt from
//! the entry headers, oldest store first.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::CacheError;

use super::encoder::CropBox;

/// Default on-disk budget: 100MB
pub const DEFAULT_ROI_CACHE_CAPACITY: u64 = 100 * 1024 * 1024;

/// Magic bytes at the start of every entry file.
pub const ENTRY_MAGIC: &[u8; 4] = b"ROI1";

/// Size of the entry header in bytes.
pub const ENTRY_HEADER_LEN: usize = 20;

/// `expires_at` value for entries without a TTL.
const NEVER_EXPIRES: u64 = u64::MAX;

const ENTRY_EXTENSION: &str = "roi";
const TEMP_EXTENSION: &str = "tmp";

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of a cached crop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoiKey {
    /// Source URL
    pub url: String,

    /// Frame offset in milliseconds (0 for still images)
    pub timestamp_ms: u64,

    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl RoiKey {
    /// Create a key for a crop of `url` at `timestamp_ms`.
    pub fn new(url: impl Into<String>, timestamp_ms: u64, crop: &CropBox) -> Self {
        Self {
            url: url.into(),
            timestamp_ms,
            left: crop.left,
            top: crop.top,
            right: crop.right,
            bottom: crop.bottom,
        }
    }

    /// Hex-encoded SHA-256 of the key fields.
    ///
    /// The URL is length-prefixed so no two distinct keys share an encoding.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.url.len() as u64).to_le_bytes());
        hasher.update(self.url.as_bytes());
        hasher.update(self.timestamp_ms.to_le_bytes());
        hasher.update(self.left.to_le_bytes());
        hasher.update(self.top.to_le_bytes());
        hasher.update(self.right.to_le_bytes());
        hasher.update(self.bottom.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time for TTL decisions.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`RoiCache`].
#[derive(Debug, Clone)]
pub struct RoiCacheConfig {
    /// Directory holding the entry files
    pub dir: PathBuf,

    /// Maximum total size of entry files in bytes
    pub max_size: u64,

    /// Lifetime of an entry; `None` keeps entries until evicted
    pub ttl: Option<Duration>,
}

impl RoiCacheConfig {
    /// Config for `dir` with the default budget and no TTL.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size: DEFAULT_ROI_CACHE_CAPACITY,
            ttl: None,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

// =============================================================================
// Entry header
// =============================================================================

fn encode_header(stored_at: u64, expires_at: u64) -> [u8; ENTRY_HEADER_LEN] {
    let mut header = [0u8; ENTRY_HEADER_LEN];
    header[0..4].copy_from_slice(ENTRY_MAGIC);
    header[4..12].copy_from_slice(&stored_at.to_le_bytes());
    header[12..20].copy_from_slice(&expires_at.to_le_bytes());
    header
}

/// Parse `(stored_at, expires_at)` from the start of an entry.
fn parse_header(data: &[u8]) -> Result<(u64, u64), String> {
    if data.len() < ENTRY_HEADER_LEN {
        return Err(format!("entry is {} bytes, shorter than its header", data.len()));
    }
    if &data[0..4] != ENTRY_MAGIC {
        return Err("bad magic".to_string());
    }

    let mut stored_at = [0u8; 8];
    let mut expires_at = [0u8; 8];
    stored_at.copy_from_slice(&data[4..12]);
    expires_at.copy_from_slice(&data[12..20]);

    Ok((u64::from_le_bytes(stored_at), u64::from_le_bytes(expires_at)))
}

/// Returns `true` for a 64-character lowercase hex digest.
fn is_digest(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// =============================================================================
// ROI Cache
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    /// Entry file size including header
    size: u64,
    expires_at: u64,
}

impl IndexEntry {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    /// Digest -> entry, in access order
    index: LruCache<String, IndexEntry>,
    current_size: u64,
}

/// Persisted, size-bounded cache of encoded crops.
///
/// All methods are synchronous and perform blocking filesystem I/O on the
/// calling thread. The index lock is held for the duration of each
/// operation except the temporary-file write in [`set`](Self::set).
pub struct RoiCache {
    dir: PathBuf,
    max_size: u64,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    temp_counter: AtomicU64,
}

impl RoiCache {
    /// Open (or create) the cache described by `config`.
    pub fn open(config: RoiCacheConfig) -> Result<Self, CacheError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the cache using a custom clock.
    pub fn open_with_clock(config: RoiCacheConfig, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.dir).map_err(|e| CacheError::io(&config.dir, e))?;

        let cache = Self {
            dir: config.dir,
            max_size: config.max_size,
            ttl: config.ttl,
            clock,
            inner: Mutex::new(Inner {
                index: LruCache::unbounded(),
                current_size: 0,
            }),
            temp_counter: AtomicU64::new(0),
        };

        cache.rebuild_index()?;
        Ok(cache)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", digest, ENTRY_EXTENSION))
    }

    /// Scan the directory, drop temp and corrupt files, and index the rest.
    fn rebuild_index(&self) -> Result<(), CacheError> {
        let mut found: Vec<(u64, String, IndexEntry)> = Vec::new();

        let dir = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }

            match path.extension().and_then(|e| e.to_str()) {
                Some(TEMP_EXTENSION) => {
                    debug!(path = %path.display(), "Removing stray temp file");
                    remove_file_quiet(&path);
                }
                Some(ENTRY_EXTENSION) => {
                    let Some(digest) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    if !is_digest(digest) {
                        continue;
                    }

                    match read_entry_header(&path) {
                        Ok((stored_at, entry)) => found.push((stored_at, digest.to_string(), entry)),
                        Err(e) => {
                            warn!(error = %e, "Removing unreadable cache entry");
                            remove_file_quiet(&path);
                        }
                    }
                }
                _ => {}
            }
        }

        // Oldest store is least recently used
        found.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let mut inner = self.lock();
        for (_, digest, entry) in found {
            inner.current_size += entry.size;
            inner.index.put(digest, entry);
        }
        let evicted = self.evict_to_budget(&mut inner);

        info!(
            dir = %self.dir.display(),
            entries = inner.index.len(),
            size = inner.current_size,
            evicted,
            "Opened ROI cache"
        );
        Ok(())
    }

    /// Get the cached bytes for `key`, marking the entry as recently used.
    ///
    /// Expired entries are treated as absent and purged. An entry that cannot
    /// be read is dropped and reported as a miss.
    pub fn get(&self, key: &RoiKey) -> Option<Bytes> {
        let digest = key.digest();
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        let entry = *inner.index.get(&digest)?;
        if entry.is_expired(now) {
            debug!(digest = %digest, "ROI entry expired");
            self.remove_locked(&mut inner, &digest);
            return None;
        }

        let path = self.entry_path(&digest);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to read ROI entry");
                }
                self.remove_locked(&mut inner, &digest);
                return None;
            }
        };

        if let Err(reason) = parse_header(&data) {
            warn!(path = %path.display(), reason = %reason, "Dropping corrupt ROI entry");
            self.remove_locked(&mut inner, &digest);
            return None;
        }

        Some(Bytes::from(data).slice(ENTRY_HEADER_LEN..))
    }

    /// Check if a live entry exists without updating LRU order.
    pub fn contains(&self, key: &RoiKey) -> bool {
        let now = self.clock.now_millis();
        self.lock()
            .index
            .peek(&key.digest())
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Store `data` under `key`, replacing any existing entry.
    ///
    /// Least-recently-used entries are evicted until the cache is within its
    /// budget. An entry larger than the whole budget is not stored.
    pub fn set(&self, key: &RoiKey, data: &[u8]) -> Result<(), CacheError> {
        let digest = key.digest();
        let size = (ENTRY_HEADER_LEN + data.len()) as u64;

        if size > self.max_size {
            debug!(digest = %digest, size, max_size = self.max_size, "ROI entry exceeds cache budget");
            let mut inner = self.lock();
            self.remove_locked(&mut inner, &digest);
            return Ok(());
        }

        let stored_at = self.clock.now_millis();
        let expires_at = match self.ttl {
            Some(ttl) => {
                stored_at.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
            }
            None => NEVER_EXPIRES,
        };

        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.{}",
            digest,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));

        if let Err(e) = write_entry(&temp_path, &encode_header(stored_at, expires_at), data) {
            remove_file_quiet(&temp_path);
            return Err(e);
        }

        let final_path = self.entry_path(&digest);
        let mut inner = self.lock();

        if let Err(e) = fs::rename(&temp_path, &final_path) {
            remove_file_quiet(&temp_path);
            return Err(CacheError::io(&final_path, e));
        }

        if let Some(old) = inner.index.put(digest, IndexEntry { size, expires_at }) {
            inner.current_size = inner.current_size.saturating_sub(old.size);
        }
        inner.current_size += size;

        self.evict_to_budget(&mut inner);
        Ok(())
    }

    /// Purge all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn expire(&self) -> usize {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        let expired: Vec<String> = inner
            .index
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(digest, _)| digest.clone())
            .collect();

        for digest in &expired {
            self.remove_locked(&mut inner, digest);
        }

        if !expired.is_empty() {
            info!(purged = expired.len(), remaining = inner.index.len(), "Expired ROI entries");
        }
        expired.len()
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.lock();

        let dir = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        for dir_entry in dir {
            let path = dir_entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if matches!(ext, Some(ENTRY_EXTENSION) | Some(TEMP_EXTENSION)) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::io(&path, e)),
                }
            }
        }

        inner.index.clear();
        inner.current_size = 0;
        info!(dir = %self.dir.display(), "Cleared ROI cache");
        Ok(())
    }

    /// Remove one entry and its file.
    fn remove_locked(&self, inner: &mut Inner, digest: &str) {
        if let Some(entry) = inner.index.pop(digest) {
            inner.current_size = inner.current_size.saturating_sub(entry.size);
            remove_file_quiet(&self.entry_path(digest));
        }
    }

    /// Evict LRU entries until within budget. Returns the number evicted.
    fn evict_to_budget(&self, inner: &mut Inner) -> usize {
        let mut evicted = 0;
        while inner.current_size > self.max_size {
            match inner.index.pop_lru() {
                Some((digest, entry)) => {
                    inner.current_size = inner.current_size.saturating_sub(entry.size);
                    remove_file_quiet(&self.entry_path(&digest));
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Get the current total size of entry files in bytes.
    pub fn size(&self) -> u64 {
        self.lock().current_size
    }

    /// Get the number of indexed entries (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.max_size
    }

    /// Get the configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Get the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// =============================================================================
// File helpers
// =============================================================================

fn write_entry(path: &Path, header: &[u8], payload: &[u8]) -> Result<(), CacheError> {
    let mut file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    file.write_all(header).map_err(|e| CacheError::io(path, e))?;
    file.write_all(payload).map_err(|e| CacheError::io(path, e))?;
    file.sync_all().map_err(|e| CacheError::io(path, e))
}

fn read_entry_header(path: &Path) -> Result<(u64, IndexEntry), CacheError> {
    let mut file = File::open(path).map_err(|e| CacheError::io(path, e))?;
    let size = file.metadata().map_err(|e| CacheError::io(path, e))?.len();

    let mut header = [0u8; ENTRY_HEADER_LEN];
    if let Err(e) = file.read_exact(&mut header) {
        return Err(if e.kind() == ErrorKind::UnexpectedEof {
            CacheError::Corrupt {
                path: path.display().to_string(),
                reason: format!("entry is {} bytes, shorter than its header", size),
            }
        } else {
            CacheError::io(path, e)
        });
    }

    let (stored_at, expires_at) = parse_header(&header).map_err(|reason| CacheError::Corrupt {
        path: path.display().to_string(),
        reason,
    })?;

    Ok((stored_at, IndexEntry { size, expires_at }))
}

fn remove_file_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
