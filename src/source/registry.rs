//! Source registry: cached, single-flight source resolution.
//!
//! The registry provides:
//! - Lookup in the [`SourceCache`] before any remote work
//! - Dispatch to the image or video-frame fetcher by [`SourceKind`]
//! - Singleflight so concurrent misses for one source share a single fetch
//!
//! If the task leading a fetch is cancelled, its waiters wake up with no
//! outcome and retry; one of them becomes the new leader.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use image::DynamicImage;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::CropError;
use crate::io::{FrameCapture, RemoteFetch};

use super::{ImageFetcher, SourceCache, SourceFetcher, SourceKey, SourceKind, VideoFrameFetcher};

type Outcome = Result<Arc<DynamicImage>, CropError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// In-flight state
// =============================================================================

/// State for an in-flight fetch.
struct InFlight {
    /// Notification for waiters
    notify: Notify,

    /// Set once the leader is done, successfully or not
    state: Mutex<FlightState>,
}

#[derive(Default)]
struct FlightState {
    finished: bool,
    /// `None` after finishing means the leader was cancelled
    outcome: Option<Outcome>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            state: Mutex::new(FlightState::default()),
        }
    }
}

/// Publishes the leader's outcome and releases the in-flight slot.
///
/// Runs on drop so a cancelled leader still wakes its waiters.
struct LeaderGuard<'a> {
    registry: &'a SourceRegistry,
    key: &'a SourceKey,
    flight: Arc<InFlight>,
}

impl LeaderGuard<'_> {
    fn complete(&self, outcome: Outcome) {
        lock(&self.flight.state).outcome = Some(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        {
            let mut in_flight = lock(&self.registry.in_flight);
            if in_flight
                .get(self.key)
                .is_some_and(|f| Arc::ptr_eq(f, &self.flight))
            {
                in_flight.remove(self.key);
            }
        }

        lock(&self.flight.state).finished = true;
        self.flight.notify.notify_waiters();
    }
}

// =============================================================================
// SourceRegistry
// =============================================================================

/// Resolves [`SourceKey`]s to decoded images.
///
/// Successful fetches are stored in the [`SourceCache`]; failures are
/// returned to every caller waiting on that fetch and nothing is cached.
pub struct SourceRegistry {
    /// Decoded sources
    cache: SourceCache,

    /// Fetcher for still images
    image_fetcher: Arc<dyn SourceFetcher>,

    /// Fetcher for video frames
    video_fetcher: Arc<dyn SourceFetcher>,

    /// In-flight fetches for singleflight pattern
    in_flight: Mutex<HashMap<SourceKey, Arc<InFlight>>>,
}

impl SourceRegistry {
    /// Create a registry using HTTP download for images and, if given, the
    /// capture backend for video frames.
    pub fn new(
        cache: SourceCache,
        remote: Arc<dyn RemoteFetch>,
        capture: Option<Arc<dyn FrameCapture>>,
    ) -> Self {
        Self::with_fetchers(
            cache,
            Arc::new(ImageFetcher::new(remote)),
            Arc::new(VideoFrameFetcher::new(capture)),
        )
    }

    /// Create a registry with explicit fetchers.
    pub fn with_fetchers(
        cache: SourceCache,
        image_fetcher: Arc<dyn SourceFetcher>,
        video_fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            cache,
            image_fetcher,
            video_fetcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the fetcher responsible for a kind of source.
    pub fn fetcher(&self, kind: SourceKind) -> &Arc<dyn SourceFetcher> {
        match kind {
            SourceKind::Image => &self.image_fetcher,
            SourceKind::VideoFrame => &self.video_fetcher,
        }
    }

    /// Check that sources of `kind` can be served at all.
    pub fn ensure_ready(&self, kind: SourceKind) -> Result<(), CropError> {
        self.fetcher(kind).ensure_ready()
    }

    /// Get a decoded source, fetching it if not already cached.
    ///
    /// This method:
    /// 1. Fails fast if the fetcher for `kind` is not usable
    /// 2. Checks the cache for an existing source
    /// 3. Otherwise fetches it, sharing the fetch with concurrent callers
    pub async fn resolve(&self, key: &SourceKey, kind: SourceKind) -> Outcome {
        let fetcher = self.fetcher(kind);
        fetcher.ensure_ready()?;

        loop {
            // Fast path: check cache
            if let Some(image) = self.cache.get(key) {
                debug!(url = %key.url, timestamp_ms = key.timestamp_ms, "Source cache hit");
                return Ok(image);
            }

            // Slow path: join an in-flight fetch or become leader
            let (flight, leader) = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.get(key) {
                    Some(flight) => (flight.clone(), false),
                    None => {
                        let flight = Arc::new(InFlight::new());
                        in_flight.insert(key.clone(), flight.clone());
                        (flight, true)
                    }
                }
            };

            if leader {
                return self.lead(key, fetcher.as_ref(), flight).await;
            }

            // Register for the wakeup before checking, so a leader finishing
            // in between cannot be missed
            let notified = flight.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !lock(&flight.state).finished {
                notified.await;
            }

            if let Some(outcome) = lock(&flight.state).outcome.clone() {
                return outcome;
            }

            debug!(url = %key.url, "Leading fetch was cancelled, retrying");
        }
    }

    async fn lead(
        &self,
        key: &SourceKey,
        fetcher: &dyn SourceFetcher,
        flight: Arc<InFlight>,
    ) -> Outcome {
        let guard = LeaderGuard {
            registry: self,
            key,
            flight,
        };

        // Another leader may have finished between our cache check and
        // taking the slot
        let outcome = match self.cache.get(key) {
            Some(image) => Ok(image),
            None => {
                debug!(
                    url = %key.url,
                    timestamp_ms = key.timestamp_ms,
                    fetcher = fetcher.name(),
                    "Source cache miss"
                );
                fetcher.fetch_source(key).await.map(Arc::new)
            }
        };

        if let Ok(ref image) = outcome {
            self.cache.put(key.clone(), image.clone());
        }

        guard.complete(outcome.clone());
        outcome
    }

    /// Get the underlying source cache.
    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

// =============================================================================
// Tests
// =============================================================================
