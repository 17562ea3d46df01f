//! State-driven polling of a single cached resource.
//!
//! The monitor fetches, lets the selector pick the next interval from the
//! freshly cached value, and only then sleeps. A tick never overlaps the
//! previous fetch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use curator_api_types::JobSnapshot;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, QueryOptions};
use crate::error::SyncError;

const DEFAULT_ACTIVE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_IDLE_INTERVAL_MS: u64 = 30_000;

const METRIC_POLL: &str = "curator_poll_total";

/// Polling intervals from `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval while the watched job is queued or running.
    pub active_interval_ms: u64,
    /// Interval otherwise.
    pub idle_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: DEFAULT_ACTIVE_INTERVAL_MS,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
        }
    }
}

impl PollingConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Selector for batch-fetch jobs: fast while the job still has work left.
    pub fn job_interval(&self) -> impl Fn(Option<&Value>) -> Duration + Send + Sync + 'static {
        let active = self.active_interval();
        let idle = self.idle_interval();
        move |latest| {
            let running = latest
                .filter(|value| !value.is_null())
                .and_then(|value| serde_json::from_value::<JobSnapshot>(value.clone()).ok())
                .is_some_and(|job| job.status.is_active());
            if running { active } else { idle }
        }
    }
}

/// Outcome of one poll, published after the next interval is chosen.
#[derive(Debug, Clone)]
pub struct PollTick {
    pub sequence: u64,
    pub next_interval: Duration,
    pub error: Option<SyncError>,
}

/// Running poll loop; dropping it stops polling.
pub struct PollHandle {
    key: CacheKey,
    ticks: watch::Receiver<Option<PollTick>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn latest_tick(&self) -> Option<PollTick> {
        self.ticks.borrow().clone()
    }

    /// Wait for the next completed poll. `None` once the loop has stopped.
    pub async fn next_tick(&mut self) -> Option<PollTick> {
        self.ticks.changed().await.ok()?;
        self.ticks.borrow_and_update().clone()
    }

    pub fn stop(self) {}
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(key = %self.key, "Polling stopped");
    }
}

#[derive(Clone)]
pub struct PollingMonitor {
    store: Arc<CacheStore>,
}

impl PollingMonitor {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Poll `key` until the handle is dropped.
    ///
    /// Failed polls keep the last good value in the cache; the error is
    /// recorded on the entry and on the tick.
    pub fn watch<F, Fut, S>(
        &self,
        key: CacheKey,
        options: QueryOptions,
        fetcher: F,
        selector: S,
    ) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SyncError>> + Send + 'static,
        S: Fn(Option<&Value>) -> Duration + Send + Sync + 'static,
    {
        let (tx, ticks) = watch::channel(None);
        let store = Arc::clone(&self.store);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let mut sequence = 0u64;
            loop {
                sequence += 1;
                let result = store.fetch(&task_key, options, &fetcher).await;
                let outcome = if result.is_ok() { "ok" } else { "error" };
                counter!(METRIC_POLL, "outcome" => outcome).increment(1);

                let next_interval = selector(store.value(&task_key).as_ref());
                let error = result.err();
                if let Some(error) = &error {
                    warn!(key = %task_key, sequence, error = %error, "Poll failed; keeping last value");
                }
                debug!(
                    key = %task_key,
                    sequence,
                    next_interval_ms = next_interval.as_millis() as u64,
                    "Poll settled"
                );
                tx.send_replace(Some(PollTick {
                    sequence,
                    next_interval,
                    error,
                }));
                tokio::time::sleep(next_interval).await;
            }
        });

        PollHandle { key, ticks, task }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::cache::{CacheConfig, EntryStatus, query_keys};

    fn job(status: &str) -> Value {
        json!({"id": 1, "status": status, "created_at": "2024-05-01T10:00:00", "steps": []})
    }

    #[test]
    fn job_selector_switches_on_status() {
        let selector = PollingConfig::default().job_interval();
        assert_eq!(selector(Some(&job("running"))), Duration::from_secs(5));
        assert_eq!(selector(Some(&job("queued"))), Duration::from_secs(5));
        assert_eq!(selector(Some(&job("completed"))), Duration::from_secs(30));
        assert_eq!(selector(Some(&job("failed"))), Duration::from_secs(30));
        assert_eq!(selector(Some(&Value::Null)), Duration::from_secs(30));
        assert_eq!(selector(None), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_follows_latest_status() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let monitor = PollingMonitor::new(Arc::clone(&store));
        let polls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&polls);
        let mut handle = monitor.watch(
            query_keys::batch_fetch_current(),
            QueryOptions::default().without_retry(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(job(if n < 2 { "running" } else { "completed" })) }
            },
            PollingConfig::default().job_interval(),
        );

        let first = handle.next_tick().await.expect("first tick");
        assert_eq!(first.next_interval, Duration::from_secs(5));
        let second = handle.next_tick().await.expect("second tick");
        assert_eq!(second.next_interval, Duration::from_secs(5));
        let third = handle.next_tick().await.expect("third tick");
        assert_eq!(third.next_interval, Duration::from_secs(30));

        let entry = store.get(&query_keys::batch_fetch_current());
        assert_eq!(entry.value, Some(job("completed")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_last_value() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let monitor = PollingMonitor::new(Arc::clone(&store));
        let polls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&polls);
        let mut handle = monitor.watch(
            query_keys::batch_fetch_current(),
            QueryOptions::default().without_retry(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(job("running"))
                    } else {
                        Err(SyncError::network("connection refused"))
                    }
                }
            },
            PollingConfig::default().job_interval(),
        );

        handle.next_tick().await.expect("first tick");
        let failed = handle.next_tick().await.expect("second tick");
        assert!(failed.error.is_some());
        assert_eq!(failed.next_interval, Duration::from_secs(5));

        let entry = store.get(&query_keys::batch_fetch_current());
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.value, Some(job("running")));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let monitor = PollingMonitor::new(store);
        let polls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&polls);
        let mut handle = monitor.watch(
            query_keys::batch_fetch_current(),
            QueryOptions::default(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }
            },
            |_| Duration::from_secs(1),
        );
        handle.next_tick().await.expect("tick");
        handle.stop();

        let before = polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polls.load(Ordering::SeqCst), before);
    }
}
