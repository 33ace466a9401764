//! Configuration for a harvest run.
//!
//! This module defines the per-component configuration structs that are
//! combined into [`HarvestConfig`], the top-level configuration passed to
//! `Harvester::new()`. Each component config carries documented defaults so
//! that a minimal caller only needs to supply credentials and a download
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use crate::overlap::OverlapDenominator;

/// Default page size for catalog search requests.
///
/// The catalog protocol caps row counts at 100; requesting more yields a
/// truncated page that would be indistinguishable from the end-of-results
/// signal.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default number of concurrent download workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default timeout for a single HTTP request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default maximum attempts per page fetch or download task (including the
/// initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial delay for exponential backoff (500ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default maximum backoff delay (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default minimum overlap ratio for scene retention.
///
/// Deliberately conservative in favor of inclusion: any marginal coverage
/// of a site retains the scene unless the caller tightens the threshold.
pub const DEFAULT_MIN_OVERLAP: f64 = 0.001;

/// Default minimum plausible declared size for a scene, in bytes.
///
/// The catalog occasionally advertises placeholder entries with near-zero
/// sizes; anything below this floor is skipped at task-creation time.
pub const DEFAULT_MIN_SCENE_SIZE: u64 = 1_000_000;

/// Basic-auth credentials for the catalog and download endpoints.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Retry behavior for transient failures.
///
/// The delay doubles after each failed attempt, up to a maximum delay.
/// Authentication rejections are never retried regardless of this policy.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Cap applied to the computed delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculates the backoff delay before retry number `attempt` (1-based,
    /// where 1 is the first retry).
    ///
    /// Returns `None` once the attempt budget is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);
        Some(delay.min(self.max_delay))
    }
}

/// Catalog search configuration.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Base URL of the catalog service, e.g. `https://catalog.example.com/api`.
    pub base_url: String,
    /// Rows requested per page.
    pub page_size: usize,
    /// Optional cap on the total number of scenes collected per query.
    pub max_results: Option<usize>,
    /// Retry policy for individual page fetches.
    pub retry: RetryConfig,
    /// HTTP timeout per request.
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_results: None,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Overlap filtering configuration.
#[derive(Clone, Debug)]
pub struct FilterConfig {
    /// Minimum overlap ratio (0.0 - 1.0) a scene must reach for at least
    /// one site to be retained.
    pub min_overlap: f64,
    /// Which reference area the overlap ratio is computed against.
    pub denominator: OverlapDenominator,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_overlap: DEFAULT_MIN_OVERLAP,
            denominator: OverlapDenominator::Site,
        }
    }
}

/// Download manager configuration.
#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Directory where completed scenes are written.
    pub download_dir: PathBuf,
    /// Additional directories consulted by the existing-file check.
    ///
    /// A scene already present (with matching size) in any of these is
    /// never scheduled for download.
    pub data_dirs: Vec<PathBuf>,
    /// Number of concurrent download workers.
    pub concurrency: usize,
    /// Retry policy per task. A checksum mismatch consumes one attempt and
    /// forces a restart from byte zero.
    pub retry: RetryConfig,
    /// Scenes whose declared size is below this floor are skipped.
    pub min_scene_size: u64,
    /// HTTP timeout per transfer request.
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
            data_dirs: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryConfig::default(),
            min_scene_size: DEFAULT_MIN_SCENE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Top-level configuration combining all component configs.
#[derive(Clone, Debug)]
pub struct HarvestConfig {
    pub credentials: Credentials,
    pub search: SearchConfig,
    pub filter: FilterConfig,
    pub download: DownloadConfig,
}

impl HarvestConfig {
    /// Creates a configuration with defaults for everything except the
    /// mandatory credentials and catalog URL.
    pub fn new(credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            search: SearchConfig {
                base_url: base_url.into(),
                ..SearchConfig::default()
            },
            filter: FilterConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}
