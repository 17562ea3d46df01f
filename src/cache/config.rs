//! Cache configuration and per-query options.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;

// Default values for cache configuration
const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_TIME_MS: u64 = 10 * 60 * 1000;
const DEFAULT_QUERY_RETRY_LIMIT: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1000;
const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Cache configuration from `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a successful fetch counts as fresh.
    pub stale_time_ms: u64,
    /// How long an entry without readers survives garbage collection.
    pub gc_time_ms: u64,
    /// Maximum failed attempts per query fetch before the error is kept.
    pub query_retry_limit: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            gc_time_ms: DEFAULT_GC_TIME_MS,
            query_retry_limit: DEFAULT_QUERY_RETRY_LIMIT,
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    /// Options applied to queries that do not override them.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: self.stale_time(),
            retry_limit: self.query_retry_limit,
        }
    }
}

/// Per-query fetch options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub retry_limit: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        CacheConfig::default().query_options()
    }
}

impl QueryOptions {
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry_limit = 0;
        self
    }

    /// Whether a fetch that has failed `failure_count` times should run again.
    ///
    /// Not-found and forbidden responses are final.
    pub fn should_retry(&self, failure_count: u32, error: &SyncError) -> bool {
        if matches!(error, SyncError::Cancelled | SyncError::StaleSession) {
            return false;
        }
        if matches!(error.status(), Some(403 | 404)) {
            return false;
        }
        let message = error.message();
        if message.contains("404") || message.contains("403") {
            return false;
        }
        failure_count < self.retry_limit
    }

    /// Exponential back-off before retry number `attempt` (zero-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(
            RETRY_BASE_DELAY_MS
                .saturating_mul(factor)
                .min(RETRY_MAX_DELAY_MS),
        )
    }
}
