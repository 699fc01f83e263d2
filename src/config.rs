use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::middleware::RateLimitConfig;

/// Candidate pool size for significant-mover detection: movers are filtered
/// out of the top N ranked products rather than the full dataset.
pub const MOVER_CANDIDATE_POOL: usize = 100;

/// Default number of products returned by /trends.
pub const DEFAULT_TOP_N: usize = 20;

/// Default per-category cap for /trends/categories.
pub const CATEGORY_TOP_N: usize = 10;

/// Ranked pool size for CSV/JSON exports.
pub const EXPORT_TOP_N: usize = 100;

/// Default rank-change threshold (percent) for /trends/significant.
pub const SIGNIFICANT_THRESHOLD_DEFAULT: f64 = 80.0;

/// Snapshot refresh interval (seconds) — how often to re-read the newest
/// snapshot file from the data directory.
pub const SNAPSHOT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Rate limiter retention horizon: timestamps older than this are garbage.
pub const RATE_RETENTION_SECS: f64 = 300.0;

/// Minimum interval between opportunistic rate-limiter cleanup passes.
pub const RATE_CLEANUP_INTERVAL_SECS: f64 = 60.0;

/// Retry-After returned to blacklisted IPs.
pub const BLACKLIST_RETRY_AFTER_SECS: u64 = 3600;

/// Retry-After returned when the global per-second budget is exhausted.
pub const OVERLOAD_RETRY_AFTER_SECS: u64 = 5;

/// Markdown report sizes: top list and per-category section length.
pub const REPORT_TOP_N: usize = 10;
pub const REPORT_CATEGORY_TOP_N: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for `products_*.json` snapshot files (DATA_DIR).
    pub data_dir: PathBuf,
    /// Directory the Markdown report is written into (REPORTS_DIR).
    pub reports_dir: PathBuf,
    pub log_level: String,
    pub api_port: u16,
    pub rate_limits: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut rate_limits = RateLimitConfig::default();
        if let Ok(raw) = std::env::var("WHITELIST_IPS") {
            rate_limits.whitelist_ips.extend(parse_ip_list(&raw));
        }
        if let Ok(raw) = std::env::var("BLACKLIST_IPS") {
            rate_limits.blacklist_ips = parse_ip_list(&raw);
        }

        Ok(Self {
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data/raw".to_string())
                .into(),
            reports_dir: std::env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "reports".to_string())
                .into(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            rate_limits,
        })
    }
}

/// Comma-separated IP list (WHITELIST_IPS / BLACKLIST_IPS).
/// Example: "203.0.113.7, 198.51.100.22"
fn parse_ip_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
