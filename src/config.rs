//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Default generation service endpoint for local development.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:17020/api";

/// Default number of read-merge-write attempts when an acceptance races another writer.
pub const DEFAULT_ACCEPT_RETRIES: u32 = 3;

/// Default idle time after which a finished, unclaimed run is evicted from staging.
pub const DEFAULT_STAGING_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the content-generation service (from BRANDKIT_SERVICE_URL)
    pub service_url: String,
    /// Bearer token for the generation service (from BRANDKIT_SERVICE_API_KEY)
    pub service_api_key: Option<String>,
    /// Fall back to placeholder content when the service fails (from BRANDKIT_DEGRADED_MODE)
    pub degraded_mode: bool,
    /// Delay between stage transitions (from BRANDKIT_STAGE_PACING_MS)
    pub stage_pacing: Duration,
    /// Acceptance attempts on version conflict (from BRANDKIT_ACCEPT_RETRIES)
    pub accept_retries: u32,
    /// Idle time before a finished run is evicted from staging (from BRANDKIT_STAGING_TTL_SECS)
    pub staging_ttl: Duration,
    /// Database file; `None` uses the platform data directory (from BRANDKIT_DB_PATH)
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let service_url = std::env::var("BRANDKIT_SERVICE_URL")
            .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string());

        let service_api_key = std::env::var("BRANDKIT_SERVICE_API_KEY").ok();

        let degraded_mode = std::env::var("BRANDKIT_DEGRADED_MODE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let stage_pacing = std::env::var("BRANDKIT_STAGE_PACING_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);

        let accept_retries = std::env::var("BRANDKIT_ACCEPT_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_ACCEPT_RETRIES);

        let staging_ttl = std::env::var("BRANDKIT_STAGING_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STAGING_TTL);

        let db_path = std::env::var("BRANDKIT_DB_PATH").ok().map(PathBuf::from);

        Self {
            service_url,
            service_api_key,
            degraded_mode,
            stage_pacing,
            accept_retries,
            staging_ttl,
            db_path,
        }
    }

    /// Configuration for tests: no pacing, no degraded mode, no network.
    pub fn for_tests() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            service_api_key: None,
            degraded_mode: false,
            stage_pacing: Duration::ZERO,
            accept_retries: DEFAULT_ACCEPT_RETRIES,
            staging_ttl: DEFAULT_STAGING_TTL,
            db_path: None,
        }
    }

    pub fn with_degraded_mode(mut self, enabled: bool) -> Self {
        self.degraded_mode = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
