//! ROI Streamer - crops regions of remote images and video frames.
//!
//! This binary starts the HTTP server and configures all components, or runs
//! one maintenance pass over the persisted crop cache.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roi_streamer::{
    config::{CacheConfig, Cli, Command, ServeConfig},
    io::{create_http_client, FrameCapture, HttpFetcher, HttpFrameCapture, RemoteFetch},
    roi::{CropService, RoiCache},
    server::{create_router, RouterConfig},
    source::{SourceCache, SourceRegistry},
};

#[tokio::main]
async fn main() -> ExitCode {
    let (verbose, command) = Cli::parse().into_parts();
    init_logging(verbose);

    match command {
        Command::Serve(config) => run_serve(config).await,
        Command::Expire(config) => run_expire(config),
        Command::Clear(config) => run_clear(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!(
        "  Crop cache: {} ({}MB, ttl {})",
        config.cache.roi_cache_dir,
        config.cache.roi_cache_mb,
        config
            .cache
            .roi_cache_ttl_secs
            .map_or_else(|| "none".to_string(), |s| format!("{}s", s))
    );
    info!("  Source cache: {}MB", config.image_cache_mb);
    info!("  Fetch timeout: {}s", config.fetch_timeout_secs);

    let capture_endpoint = config.capture_endpoint();
    match capture_endpoint {
        Some(ref endpoint) => info!("  Frame capture: {}", endpoint),
        None => warn!("  Frame capture: NOT CONFIGURED - video frame requests will fail"),
    }
    if config.admin {
        warn!("  Admin routes: enabled (/cache/stats, /cache/clear)");
    }

    // Open the persisted tier and drop whatever expired while we were down
    let roi_cache = match RoiCache::open(config.cache.roi_cache_config()) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("Failed to open crop cache: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let expired = roi_cache.expire();
    info!(
        "  Crop cache opened: {} entries, {} bytes ({} expired)",
        roi_cache.len(),
        roi_cache.size(),
        expired
    );

    // Outbound clients share one connection pool
    let client = match create_http_client(config.fetch_timeout()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let remote: Arc<dyn RemoteFetch> = Arc::new(HttpFetcher::with_client(client.clone()));
    let capture: Option<Arc<dyn FrameCapture>> = capture_endpoint.map(|endpoint| {
        Arc::new(HttpFrameCapture::new(
            client,
            endpoint,
            config.capture_api_key.clone(),
        )) as Arc<dyn FrameCapture>
    });

    let registry = SourceRegistry::new(
        SourceCache::with_capacity(config.image_cache_bytes()),
        remote,
        capture,
    );
    let crop_service = Arc::new(CropService::new(roi_cache.clone(), registry));

    if let Some(interval) = config.expire_interval() {
        spawn_expiry_task(roi_cache, interval);
    }

    let router = create_router(crop_service, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -o roi.png 'http://{}/crop?url=<image_url>&left=0&top=0&right=256&bottom=256'",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Periodically drop expired crops. Sweeps touch the filesystem, so they run
/// on the blocking pool.
fn spawn_expiry_task(roi_cache: Arc<RoiCache>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; startup already swept
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let cache = roi_cache.clone();
            match tokio::task::spawn_blocking(move || cache.expire()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed = removed, "Expired crop cache entries"),
                Err(e) => warn!("Crop cache expiry task failed: {}", e),
            }
        }
    });
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("██████╗  ██████╗ ██╗");
    info!("██╔══██╗██╔═══██╗██║");
    info!("██████╔╝██║   ██║██║");
    info!("██╔══██╗██║   ██║██║");
    info!("██║  ██║╚██████╔╝██║");
    info!("╚═╝  ╚═╝ ╚═════╝ ╚═╝  streamer v{}", version);
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "roi_streamer=debug,tower_http=debug"
    } else {
        "roi_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing)
        .with_admin(config.admin)
        .with_request_timeout(config.request_timeout());

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Maintenance Commands
// =============================================================================

fn open_cache(config: &CacheConfig) -> Option<RoiCache> {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return None;
    }

    match RoiCache::open(config.roi_cache_config()) {
        Ok(cache) => Some(cache),
        Err(e) => {
            error!("Failed to open crop cache: {}", e);
            None
        }
    }
}

fn run_expire(config: CacheConfig) -> ExitCode {
    let Some(cache) = open_cache(&config) else {
        return ExitCode::FAILURE;
    };

    if cache.ttl().is_none() {
        warn!("No TTL configured; entries never expire");
    }

    let removed = cache.expire();
    println!(
        "Expired {} entr{} from {} ({} remaining, {} bytes)",
        removed,
        if removed == 1 { "y" } else { "ies" },
        cache.dir().display(),
        cache.len(),
        cache.size()
    );

    ExitCode::SUCCESS
}

fn run_clear(config: CacheConfig) -> ExitCode {
    let Some(cache) = open_cache(&config) else {
        return ExitCode::FAILURE;
    };

    let count = cache.len();
    if let Err(e) = cache.clear() {
        error!("Failed to clear crop cache: {}", e);
        return ExitCode::FAILURE;
    }

    println!("Removed {} entries from {}", count, cache.dir().display());
    ExitCode::SUCCESS
}
