//! Configuration management for ROI Streamer.
//!
//! This module provides the command-line interface:
//! - Subcommands via clap (`serve`, `expire`, `clear`)
//! - Environment variables with `ROI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use roi_streamer::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Expire(cache) | Command::Clear(cache) => println!("{}", cache.roi_cache_dir),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `ROI_HOST` - Server bind address (default: 0.0.0.0)
//! - `ROI_PORT` - Server port (default: 3000)
//! - `ROI_IMAGE_CACHE_MB` - Decoded source cache budget in MB (default: 100)
//! - `ROI_CACHE_DIR` - Directory of the persisted crop cache
//! - `ROI_CACHE_MB` - Persisted crop cache budget in MB (default: 100)
//! - `ROI_CACHE_TTL_SECS` - Lifetime of a persisted crop (default: none)
//! - `ROI_CAPTURE_URL` - Base URL of the frame capture service
//! - `ROI_CAPTURE_API_KEY` - API key sent to the frame capture service
//! - `ROI_FETCH_TIMEOUT_SECS` - Timeout for outbound fetches (default: 30)
//! - `ROI_REQUEST_TIMEOUT_SECS` - Deadline for one crop request (default: none)
//! - `ROI_EXPIRE_INTERVAL_SECS` - Expiry sweep period, 0 disables (default: 300)
//! - `ROI_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `ROI_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `ROI_ENABLE_ADMIN` - Expose `/cache/stats` and `/cache/clear`

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::roi::RoiCacheConfig;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default persisted crop cache directory.
pub const DEFAULT_ROI_CACHE_DIR: &str = "/tmp/roi_streamer_cache";

/// Default persisted crop cache budget in MB.
pub const DEFAULT_ROI_CACHE_MB: u64 = 100;

/// Default decoded source cache budget in MB.
pub const DEFAULT_IMAGE_CACHE_MB: usize = 100;

/// Default outbound fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default expiry sweep period in seconds (5 minutes).
pub const DEFAULT_EXPIRE_INTERVAL_SECS: u64 = 300;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

const BYTES_PER_MB: u64 = 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// ROI Streamer - crops regions of remote images and video frames.
///
/// Fetches sources over HTTP (video frames via a capture service), keeps
/// decoded sources in memory, and persists encoded crops on disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "roi-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Split into the verbosity flag and the selected subcommand.
    pub fn into_parts(self) -> (bool, Command) {
        (self.verbose, self.command)
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server.
    Serve(ServeConfig),

    /// Drop expired entries from the persisted crop cache and exit.
    Expire(CacheConfig),

    /// Remove every entry from the persisted crop cache and exit.
    Clear(CacheConfig),
}

/// Settings for the persisted crop cache, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding persisted crops.
    #[arg(long, default_value = DEFAULT_ROI_CACHE_DIR, env = "ROI_CACHE_DIR")]
    pub roi_cache_dir: String,

    /// Maximum total size of persisted crops in MB.
    #[arg(long, default_value_t = DEFAULT_ROI_CACHE_MB, env = "ROI_CACHE_MB")]
    pub roi_cache_mb: u64,

    /// Lifetime of a persisted crop in seconds.
    ///
    /// If not specified, crops are kept until evicted for space.
    #[arg(long, env = "ROI_CACHE_TTL_SECS")]
    pub roi_cache_ttl_secs: Option<u64>,
}

impl CacheConfig {
    /// Validate the cache settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.roi_cache_dir.is_empty() {
            return Err("ROI cache directory is required. Set --roi-cache-dir or ROI_CACHE_DIR".to_string());
        }
        if self.roi_cache_mb == 0 {
            return Err("roi_cache_mb must be greater than 0".to_string());
        }
        if self.roi_cache_ttl_secs == Some(0) {
            return Err(
                "roi_cache_ttl_secs must be greater than 0; omit it to disable expiry".to_string(),
            );
        }
        Ok(())
    }

    /// Budget in bytes.
    pub fn roi_cache_bytes(&self) -> u64 {
        self.roi_cache_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.roi_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Settings for [`RoiCache::open`](crate::roi::RoiCache::open).
    pub fn roi_cache_config(&self) -> RoiCacheConfig {
        RoiCacheConfig::new(PathBuf::from(&self.roi_cache_dir))
            .with_max_size(self.roi_cache_bytes())
            .with_ttl(self.ttl())
    }
}

/// Settings for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "ROI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "ROI_PORT")]
    pub port: u16,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    #[command(flatten)]
    pub cache: CacheConfig,

    /// Maximum total size of decoded sources kept in memory, in MB.
    #[arg(long, default_value_t = DEFAULT_IMAGE_CACHE_MB, env = "ROI_IMAGE_CACHE_MB")]
    pub image_cache_mb: usize,

    /// Seconds between expiry sweeps of the persisted crop cache (0 disables).
    #[arg(long, default_value_t = DEFAULT_EXPIRE_INTERVAL_SECS, env = "ROI_EXPIRE_INTERVAL_SECS")]
    pub expire_interval_secs: u64,

    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Base URL of the frame capture service.
    ///
    /// Without it, video frame requests fail with `capture_not_configured`.
    #[arg(long, env = "ROI_CAPTURE_URL")]
    pub capture_url: Option<String>,

    /// API key for the frame capture service.
    #[arg(long, env = "ROI_CAPTURE_API_KEY", hide_env_values = true)]
    pub capture_api_key: Option<String>,

    /// Timeout for outbound fetches in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "ROI_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: u64,

    /// Deadline for a single crop request in seconds.
    #[arg(long, env = "ROI_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "ROI_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "ROI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Expose the cache administration routes.
    #[arg(long = "enable-admin", default_value_t = false, env = "ROI_ENABLE_ADMIN")]
    pub admin: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;

        if self.image_cache_mb == 0 {
            return Err("image_cache_mb must be greater than 0".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be greater than 0".to_string());
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }

        if let Some(ref raw) = self.capture_url {
            parse_capture_url(raw)?;
        }
        if self.capture_api_key.is_some() && self.capture_url.is_none() {
            return Err(
                "capture_api_key is set but no capture service is configured. Set --capture-url or ROI_CAPTURE_URL"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed capture service URL, if one is configured and valid.
    pub fn capture_endpoint(&self) -> Option<Url> {
        self.capture_url
            .as_deref()
            .and_then(|raw| parse_capture_url(raw).ok())
    }

    /// Decoded source cache budget in bytes.
    pub fn image_cache_bytes(&self) -> usize {
        self.image_cache_mb.saturating_mul(BYTES_PER_MB as usize)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Expiry sweep period; `None` when sweeping is disabled.
    pub fn expire_interval(&self) -> Option<Duration> {
        match self.expire_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Parse a capture service URL, accepting only absolute http(s) URLs.
fn parse_capture_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid capture_url '{}': {}", raw, e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!(
                "invalid capture_url '{}': unsupported scheme '{}'",
                raw, other
            ))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("invalid capture_url '{}': missing host", raw));
    }

    Ok(url)
}

// =============================================================================
// Tests
// =============================================================================
