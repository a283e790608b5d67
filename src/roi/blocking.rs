//! Blocking entry point into the crop pipeline.
//!
//! [`BlockingCropService`] drives the same [`CropService`] as the async path,
//! so both entry points share caches, single-flight state, and semantics.
//!
//! Work started from the blocking side can leave tasks behind that outlive
//! the call, such as the connection tasks of a pooled HTTP client. Those tasks
//! must keep running after `block_on` returns, so the facade only drives the
//! pipeline on a runtime with live worker threads: either its own
//! multi-thread runtime or a handle to the host's.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::CropError;

use super::service::{CacheStats, CachedRoi, CropRequest, CropService};

/// Worker threads of the runtime owned by [`BlockingCropService::new`].
const BLOCKING_WORKER_THREADS: usize = 1;

enum Driver {
    /// Private multi-thread runtime
    Owned(Runtime),
    /// Host runtime shared with the async path
    Shared(Handle),
}

impl Driver {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self {
            Driver::Owned(runtime) => runtime.block_on(future),
            Driver::Shared(handle) => handle.block_on(future),
        }
    }
}

/// Synchronous facade over a shared [`CropService`].
///
/// Must not be called from inside an async runtime; use the async methods
/// on [`CropService`] there.
pub struct BlockingCropService {
    driver: Driver,
    service: Arc<CropService>,
}

impl BlockingCropService {
    /// Wrap a shared service, driving it on a private multi-thread runtime.
    pub fn new(service: Arc<CropService>) -> Result<Self, CropError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(BLOCKING_WORKER_THREADS)
            .thread_name("roi-blocking")
            .enable_all()
            .build()
            .map_err(|e| CropError::Unexpected(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            driver: Driver::Owned(runtime),
            service,
        })
    }

    /// Wrap a shared service, driving it on the host runtime behind `handle`.
    ///
    /// The host must be a multi-thread runtime, since nothing else would
    /// drive it between blocking calls.
    pub fn with_handle(service: Arc<CropService>, handle: Handle) -> Result<Self, CropError> {
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(CropError::Unexpected(
                "blocking facade requires a multi-thread runtime handle".to_string(),
            ));
        }

        Ok(Self {
            driver: Driver::Shared(handle),
            service,
        })
    }

    /// Blocking [`CropService::generate_crop`].
    pub fn generate_crop(&self, request: &CropRequest) -> Result<CachedRoi, CropError> {
        self.driver.block_on(self.service.generate_crop(request))
    }

    /// Blocking [`CropService::generate_crop_with_timeout`].
    pub fn generate_crop_with_timeout(
        &self,
        request: &CropRequest,
        timeout: Duration,
    ) -> Result<CachedRoi, CropError> {
        self.driver
            .block_on(self.service.generate_crop_with_timeout(request, timeout))
    }

    /// Drop both cache tiers.
    pub fn clear_all(&self) -> Result<(), CropError> {
        self.service.clear_all()
    }

    /// Current occupancy of both cache tiers.
    pub fn cache_stats(&self) -> CacheStats {
        self.service.cache_stats()
    }

    /// The underlying async service.
    pub fn service(&self) -> &Arc<CropService> {
        &self.service
    }
}
