//! Keyed cache storage.
//!
//! Each slot holds the latest [`CacheEntry`] behind a `watch` channel, so every
//! write reaches current readers in write order. Fetches are deduplicated per
//! key and wrapped in an abortable future; cancelling one restores the status
//! the slot had before the fetch started.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

use super::config::{CacheConfig, QueryOptions};
use super::keys::{CacheKey, KeyMatcher};
use super::lock::LockExt;

const OWNER: &str = "cache::store";

const METRIC_HIT: &str = "curator_cache_hit_total";
const METRIC_MISS: &str = "curator_cache_miss_total";
const METRIC_INVALIDATED: &str = "curator_cache_invalidated_total";
const METRIC_FETCH_MS: &str = "curator_fetch_ms";

/// Identifies one optimistic mutation; tags the speculative writes it makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Empty,
    Fetching,
    Fresh,
    Stale,
    Error,
}

/// Read-only snapshot of one cache slot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Last known value; kept through refetches and failed fetches.
    pub value: Option<Value>,
    pub status: EntryStatus,
    pub fetched_at: Option<OffsetDateTime>,
    pub error: Option<SyncError>,
    /// Set while the value is a speculative write of a pending mutation.
    pub tag: Option<MutationId>,
}

impl CacheEntry {
    fn empty(key: CacheKey) -> Self {
        Self {
            key,
            value: None,
            status: EntryStatus::Empty,
            fetched_at: None,
            error: None,
            tag: None,
        }
    }

    /// Deserialize the cached value into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, SyncError> {
        self.value
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SyncError::from)
    }

    pub fn is_fetching(&self) -> bool {
        self.status == EntryStatus::Fetching
    }
}

struct InFlight {
    id: u64,
    abort: AbortHandle,
    prior: EntryStatus,
}

struct Slot {
    entry: watch::Sender<CacheEntry>,
    in_flight: Option<InFlight>,
    updated: Option<Instant>,
    stale_on_settle: bool,
}

impl Slot {
    fn new(key: CacheKey) -> Self {
        let (entry, _) = watch::channel(CacheEntry::empty(key));
        Self {
            entry,
            in_flight: None,
            updated: None,
            stale_on_settle: false,
        }
    }

    fn status(&self) -> EntryStatus {
        self.entry.borrow().status
    }
}

enum FetchStart {
    Run {
        id: u64,
        registration: AbortRegistration,
    },
    Join(watch::Receiver<CacheEntry>),
}

/// Process-wide query cache.
///
/// Consumers only ever receive cloned snapshots; all writes go through the
/// methods below.
pub struct CacheStore {
    config: CacheConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_fetch: AtomicU64,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            next_fetch: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn default_options(&self) -> QueryOptions {
        self.config.query_options()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Snapshot of `key`; an `Empty` entry when nothing is cached.
    pub fn get(&self, key: &CacheKey) -> CacheEntry {
        self.slots
            .lock_or_recover(OWNER, "get")
            .get(key)
            .map_or_else(|| CacheEntry::empty(key.clone()), |slot| slot.entry.borrow().clone())
    }

    pub fn value(&self, key: &CacheKey) -> Option<Value> {
        self.get(key).value
    }

    /// Register a reader; it observes every subsequent write to `key`.
    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<CacheEntry> {
        self.slots
            .lock_or_recover(OWNER, "subscribe")
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()))
            .entry
            .subscribe()
    }

    /// Snapshots of every present key the matcher selects, in key order.
    pub fn entries_matching(&self, matcher: &KeyMatcher) -> Vec<CacheEntry> {
        let slots = self.slots.lock_or_recover(OWNER, "entries_matching");
        let mut entries: Vec<CacheEntry> = slots
            .iter()
            .filter(|(key, _)| matcher.matches(key))
            .map(|(_, slot)| slot.entry.borrow().clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn len(&self) -> usize {
        self.slots.lock_or_recover(OWNER, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store an authoritative value and mark it fresh.
    pub fn set(&self, key: &CacheKey, value: Value) {
        self.write(key, value, None, "set");
    }

    /// Replace the value with `f(current)`; `None` from `f` leaves it untouched.
    pub fn update<F>(&self, key: &CacheKey, f: F) -> Option<Value>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let current = self.value(key);
        let next = f(current.as_ref())?;
        self.set(key, next.clone());
        Some(next)
    }

    pub(crate) fn write_tagged(&self, key: &CacheKey, value: Value, tag: MutationId) {
        self.write(key, value, Some(tag), "write_tagged");
    }

    fn write(&self, key: &CacheKey, value: Value, tag: Option<MutationId>, op: &'static str) {
        let mut slots = self.slots.lock_or_recover(OWNER, op);
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()));
        slot.updated = Some(Instant::now());
        let fetching = slot.in_flight.is_some();
        slot.entry.send_modify(|entry| {
            entry.value = Some(value);
            entry.status = if fetching {
                EntryStatus::Fetching
            } else {
                EntryStatus::Fresh
            };
            entry.fetched_at = Some(OffsetDateTime::now_utc());
            entry.error = None;
            entry.tag = tag;
        });
        debug!(key = %key, op, tagged = tag.is_some(), "Cache value written");
    }

    /// Put a previously captured snapshot back in place.
    pub(crate) fn restore(&self, snapshot: CacheEntry) {
        let mut slots = self.slots.lock_or_recover(OWNER, "restore");
        let slot = slots
            .entry(snapshot.key.clone())
            .or_insert_with(|| Slot::new(snapshot.key.clone()));
        if snapshot.value.is_none() {
            slot.updated = None;
        }
        let mut snapshot = snapshot;
        if slot.in_flight.is_some() {
            snapshot.status = EntryStatus::Fetching;
        }
        slot.entry.send_replace(snapshot);
    }

    /// Tag carried by the current value of `key`, if any.
    pub(crate) fn tag_of(&self, key: &CacheKey) -> Option<MutationId> {
        self.slots
            .lock_or_recover(OWNER, "tag_of")
            .get(key)
            .and_then(|slot| slot.entry.borrow().tag)
    }

    /// Drop `tag` from `key` once its mutation is confirmed.
    pub(crate) fn clear_tag(&self, key: &CacheKey, tag: MutationId) {
        let slots = self.slots.lock_or_recover(OWNER, "clear_tag");
        if let Some(slot) = slots.get(key) {
            slot.entry.send_if_modified(|entry| {
                if entry.tag == Some(tag) {
                    entry.tag = None;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Mark matching entries stale so active readers refetch them.
    ///
    /// Entries mid-fetch are flagged so the value they settle with is stored
    /// as stale.
    pub fn invalidate(&self, matcher: &KeyMatcher) -> usize {
        let mut slots = self.slots.lock_or_recover(OWNER, "invalidate");
        let mut count = 0usize;
        for (_, slot) in slots.iter_mut().filter(|(key, _)| matcher.matches(key)) {
            if slot.in_flight.is_some() {
                slot.stale_on_settle = true;
                count += 1;
                continue;
            }
            if matches!(slot.status(), EntryStatus::Fresh | EntryStatus::Error) {
                slot.entry.send_modify(|entry| entry.status = EntryStatus::Stale);
                count += 1;
            }
        }
        drop(slots);

        counter!(METRIC_INVALIDATED).increment(count as u64);
        info!(matcher = %matcher, invalidated = count, "Cache keys invalidated");
        count
    }

    /// Abort in-flight fetches for matching keys.
    pub fn cancel_in_flight(&self, matcher: &KeyMatcher) -> usize {
        let mut slots = self.slots.lock_or_recover(OWNER, "cancel_in_flight");
        let mut count = 0usize;
        for (key, slot) in slots.iter_mut().filter(|(key, _)| matcher.matches(key)) {
            if let Some(flight) = slot.in_flight.take() {
                flight.abort.abort();
                let restored = restored_status(flight.prior, slot.stale_on_settle);
                slot.stale_on_settle = false;
                slot.entry.send_modify(|entry| entry.status = restored);
                info!(key = %key, fetch_id = flight.id, "In-flight fetch cancelled");
                count += 1;
            }
        }
        count
    }

    /// Drop matching slots entirely; their readers see the channel close.
    pub fn remove(&self, matcher: &KeyMatcher) -> usize {
        let mut slots = self.slots.lock_or_recover(OWNER, "remove");
        let before = slots.len();
        slots.retain(|key, slot| {
            if !matcher.matches(key) {
                return true;
            }
            if let Some(flight) = slot.in_flight.take() {
                flight.abort.abort();
            }
            false
        });
        before - slots.len()
    }

    /// Drop every slot, aborting all in-flight fetches.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock_or_recover(OWNER, "clear");
        let removed = slots.len();
        for (_, slot) in slots.drain() {
            if let Some(flight) = slot.in_flight {
                flight.abort.abort();
            }
        }
        info!(removed, "Cache cleared");
        removed
    }

    /// Remove entries nobody reads whose last write is older than the GC time.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.config.gc_time();
        let mut slots = self.slots.lock_or_recover(OWNER, "collect_garbage");
        let before = slots.len();
        slots.retain(|_, slot| {
            let idle = slot.in_flight.is_none() && slot.entry.receiver_count() == 0;
            let expired = slot
                .updated
                .is_none_or(|updated| updated.elapsed() >= gc_time);
            !(idle && expired)
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, "Cache garbage collected");
        }
        removed
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Return the cached value while it is fresh, otherwise fetch it.
    pub async fn ensure<F, Fut>(
        &self,
        key: &CacheKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<Value, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        if let Some(value) = self.fresh_value(key, options) {
            counter!(METRIC_HIT).increment(1);
            return Ok(value);
        }
        counter!(METRIC_MISS).increment(1);
        self.fetch(key, options, fetcher).await
    }

    /// Fetch `key` now, joining a fetch already in flight for it.
    pub async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<Value, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        let (id, registration) = match self.begin_fetch(key) {
            FetchStart::Join(receiver) => return join_fetch(receiver).await,
            FetchStart::Run { id, registration } => (id, registration),
        };

        let _guard = FetchGuard {
            store: self,
            key,
            id,
        };
        let started = Instant::now();
        debug!(key = %key, fetch_id = id, "Cache fetch started");
        let outcome = Abortable::new(fetch_with_retry(key, options, &fetcher), registration).await;
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(result) => self.settle(key, id, result),
            Err(_aborted) => {
                debug!(key = %key, fetch_id = id, "Cache fetch aborted");
                Err(SyncError::Cancelled)
            }
        }
    }

    /// Run `work` as the one in-flight fetch of `key` and store its value.
    ///
    /// Unlike [`fetch`](Self::fetch) this never joins: it returns `None`
    /// without polling `work` when a fetch of `key` is already running.
    /// Cancelling the key aborts `work` and yields `Cancelled`.
    pub async fn fetch_exclusive<Fut>(
        &self,
        key: &CacheKey,
        work: Fut,
    ) -> Option<Result<Value, SyncError>>
    where
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        let (id, registration) = match self.begin_fetch(key) {
            FetchStart::Join(_) => return None,
            FetchStart::Run { id, registration } => (id, registration),
        };

        let _guard = FetchGuard {
            store: self,
            key,
            id,
        };
        let started = Instant::now();
        debug!(key = %key, fetch_id = id, "Exclusive fetch started");
        let outcome = Abortable::new(work, registration).await;
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        Some(match outcome {
            Ok(result) => self.settle(key, id, result),
            Err(_aborted) => {
                debug!(key = %key, fetch_id = id, "Exclusive fetch aborted");
                Err(SyncError::Cancelled)
            }
        })
    }

    fn fresh_value(&self, key: &CacheKey, options: QueryOptions) -> Option<Value> {
        let slots = self.slots.lock_or_recover(OWNER, "fresh_value");
        let slot = slots.get(key)?;
        let updated = slot.updated?;
        let entry = slot.entry.borrow();
        if entry.status != EntryStatus::Fresh || updated.elapsed() >= options.stale_time {
            return None;
        }
        entry.value.clone()
    }

    fn begin_fetch(&self, key: &CacheKey) -> FetchStart {
        let mut slots = self.slots.lock_or_recover(OWNER, "begin_fetch");
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()));
        if slot.in_flight.is_some() {
            return FetchStart::Join(slot.entry.subscribe());
        }

        let (abort, registration) = AbortHandle::new_pair();
        let id = self.next_fetch.fetch_add(1, Ordering::SeqCst);
        let prior = slot.status();
        slot.in_flight = Some(InFlight { id, abort, prior });
        slot.stale_on_settle = false;
        slot.entry
            .send_modify(|entry| entry.status = EntryStatus::Fetching);
        FetchStart::Run { id, registration }
    }

    fn settle(
        &self,
        key: &CacheKey,
        id: u64,
        result: Result<Value, SyncError>,
    ) -> Result<Value, SyncError> {
        let mut slots = self.slots.lock_or_recover(OWNER, "settle");
        let Some(slot) = slots.get_mut(key) else {
            return result;
        };
        if slot.in_flight.as_ref().map(|flight| flight.id) != Some(id) {
            return result;
        }
        slot.in_flight = None;
        let stale = std::mem::take(&mut slot.stale_on_settle);

        match &result {
            Ok(value) => {
                slot.updated = Some(Instant::now());
                slot.entry.send_modify(|entry| {
                    entry.value = Some(value.clone());
                    entry.status = if stale {
                        EntryStatus::Stale
                    } else {
                        EntryStatus::Fresh
                    };
                    entry.fetched_at = Some(OffsetDateTime::now_utc());
                    entry.error = None;
                    entry.tag = None;
                });
                debug!(key = %key, fetch_id = id, stale, "Cache fetch settled");
            }
            Err(error) => {
                slot.entry.send_modify(|entry| {
                    entry.status = EntryStatus::Error;
                    entry.error = Some(error.clone());
                });
                warn!(key = %key, fetch_id = id, error = %error, "Cache fetch failed");
            }
        }
        result
    }

    /// Clear the in-flight marker of a fetch whose future was dropped.
    fn release(&self, key: &CacheKey, id: u64) {
        let mut slots = self.slots.lock_or_recover(OWNER, "release");
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        if slot.in_flight.as_ref().map(|flight| flight.id) != Some(id) {
            return;
        }
        if let Some(flight) = slot.in_flight.take() {
            let restored = restored_status(flight.prior, slot.stale_on_settle);
            slot.stale_on_settle = false;
            slot.entry.send_modify(|entry| entry.status = restored);
            debug!(key = %key, fetch_id = id, "Abandoned fetch released");
        }
    }

    // ========================================================================
    // Active readers
    // ========================================================================

    /// Keep `key` populated while the returned observer is alive.
    ///
    /// The observer fetches when the key is missing or stale and refetches
    /// every time it is invalidated. Dropping the observer stops it.
    pub fn observe<F, Fut>(
        self: &Arc<Self>,
        key: CacheKey,
        options: QueryOptions,
        fetcher: F,
    ) -> QueryObserver
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SyncError>> + Send + 'static,
    {
        let receiver = self.subscribe(&key);
        let store = Arc::clone(self);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            loop {
                if let Err(error) = store.ensure(&task_key, options, &fetcher).await {
                    debug!(key = %task_key, error = %error, "Observed query fetch failed");
                }
                let mut updates = store.subscribe(&task_key);
                let closed = updates
                    .wait_for(|entry| {
                        matches!(entry.status, EntryStatus::Stale | EntryStatus::Empty)
                    })
                    .await
                    .is_err();
                if closed {
                    debug!(key = %task_key, "Observed slot removed; resubscribing");
                }
            }
        });

        QueryObserver {
            store: Arc::clone(self),
            key,
            receiver,
            task,
        }
    }
}

fn restored_status(prior: EntryStatus, invalidated: bool) -> EntryStatus {
    match prior {
        EntryStatus::Fresh | EntryStatus::Error if invalidated => EntryStatus::Stale,
        EntryStatus::Fetching => EntryStatus::Stale,
        other => other,
    }
}

async fn join_fetch(mut receiver: watch::Receiver<CacheEntry>) -> Result<Value, SyncError> {
    let entry = receiver
        .wait_for(|entry| entry.status != EntryStatus::Fetching)
        .await
        .map_err(|_| SyncError::Cancelled)?
        .clone();
    match entry.status {
        EntryStatus::Error => Err(entry.error.unwrap_or(SyncError::Cancelled)),
        _ => entry.value.ok_or(SyncError::Cancelled),
    }
}

async fn fetch_with_retry<F, Fut>(
    key: &CacheKey,
    options: QueryOptions,
    fetcher: &F,
) -> Result<Value, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Value, SyncError>>,
{
    let mut failures = 0u32;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(error) if options.should_retry(failures, &error) => {
                let delay = options.retry_delay(failures);
                failures += 1;
                debug!(key = %key, attempt = failures, delay_ms = delay.as_millis() as u64, error = %error, "Retrying fetch");
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

struct FetchGuard<'a> {
    store: &'a CacheStore,
    key: &'a CacheKey,
    id: u64,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.store.release(self.key, self.id);
    }
}

/// Handle of an active reader started by [`CacheStore::observe`].
pub struct QueryObserver {
    store: Arc<CacheStore>,
    key: CacheKey,
    receiver: watch::Receiver<CacheEntry>,
    task: JoinHandle<()>,
}

impl QueryObserver {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn snapshot(&self) -> CacheEntry {
        self.store.get(&self.key)
    }

    /// Wait for the next write to the observed key.
    pub async fn changed(&mut self) -> CacheEntry {
        if self.receiver.changed().await.is_err() {
            self.receiver = self.store.subscribe(&self.key);
        }
        self.snapshot()
    }

    /// Wait until the observed entry satisfies `predicate`.
    pub async fn wait_for<P>(&mut self, mut predicate: P) -> CacheEntry
    where
        P: FnMut(&CacheEntry) -> bool,
    {
        loop {
            let current = self.snapshot();
            if predicate(&current) {
                return current;
            }
            self.changed().await;
        }
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::cache::keys::{ResourceType, View};
    use crate::cache::query_keys;

    fn store() -> CacheStore {
        CacheStore::new(CacheConfig::default())
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let store = store();
        let entry = store.get(&query_keys::feeds());
        assert_eq!(entry.status, EntryStatus::Empty);
        assert!(entry.value.is_none());
    }

    #[tokio::test]
    async fn set_notifies_readers_after_write() {
        let store = store();
        let key = query_keys::feeds();
        let mut reader = store.subscribe(&key);

        store.set(&key, json!([{"id": 1}]));

        reader.changed().await.expect("sender alive");
        let entry = reader.borrow().clone();
        assert_eq!(entry.status, EntryStatus::Fresh);
        assert_eq!(entry.value, Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn ensure_serves_fresh_values_without_fetching() {
        let store = store();
        let key = query_keys::tags();
        store.set(&key, json!(["cached"]));

        let calls = AtomicUsize::new(0);
        let value = store
            .ensure(&key, QueryOptions::default(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(["fetched"]))
            })
            .await
            .expect("value");

        assert_eq!(value, json!(["cached"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidate_marks_stale_and_ensure_refetches() {
        let store = store();
        let key = query_keys::tags();
        store.set(&key, json!(["old"]));

        let count = store.invalidate(&KeyMatcher::Resource(ResourceType::Tags));
        assert_eq!(count, 1);
        assert_eq!(store.get(&key).status, EntryStatus::Stale);

        let value = store
            .ensure(&key, QueryOptions::default(), || async { Ok(json!(["new"])) })
            .await
            .expect("value");
        assert_eq!(value, json!(["new"]));
        assert_eq!(store.get(&key).status, EntryStatus::Fresh);
    }

    #[test]
    fn invalidate_ignores_keys_added_later() {
        let store = store();
        let matcher = KeyMatcher::Resource(ResourceType::Leads);
        store.invalidate(&matcher);

        let key = CacheKey::new(ResourceType::Leads, View::List);
        store.set(&key, json!([]));
        assert_eq!(store.get(&key).status, EntryStatus::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_time_expires_freshness() {
        let store = store();
        let key = query_keys::feeds();
        store.set(&key, json!([1]));

        let options = QueryOptions::default().with_stale_time(Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(3)).await;

        let value = store
            .ensure(&key, options, || async { Ok(json!([2])) })
            .await
            .expect("value");
        assert_eq!(value, json!([2]));
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let store = store();
        let key = query_keys::categories();
        let calls = AtomicUsize::new(0);
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = futures::future::FutureExt::shared(async move {
            let _ = gate.await;
        });

        let fetcher = || {
            let gate = gate.clone();
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                gate.await;
                Ok(json!([{"id": 9}]))
            }
        };

        let first = store.fetch(&key, QueryOptions::default(), fetcher);
        let second = async {
            tokio::task::yield_now().await;
            store.fetch(&key, QueryOptions::default(), fetcher).await
        };
        let releaser = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            let _ = release.send(());
        };

        let (a, b, ()) = tokio::join!(first, second, releaser);
        assert_eq!(a.expect("first"), json!([{"id": 9}]));
        assert_eq!(b.expect("second"), json!([{"id": 9}]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_in_flight_aborts_and_restores_status() {
        let store = Arc::new(store());
        let key = query_keys::feeds();
        store.set(&key, json!(["before"]));
        store.invalidate(&KeyMatcher::Exact(key.clone()));

        let task_store = Arc::clone(&store);
        let task_key = key.clone();
        let fetch = tokio::spawn(async move {
            task_store
                .fetch(&task_key, QueryOptions::default(), || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!(["late"]))
                })
                .await
        });

        let mut reader = store.subscribe(&key);
        reader
            .wait_for(|entry| entry.status == EntryStatus::Fetching)
            .await
            .expect("fetch starts");

        assert_eq!(store.cancel_in_flight(&KeyMatcher::Resource(ResourceType::Feeds)), 1);
        let result = fetch.await.expect("task joins");
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Stale);
        assert_eq!(entry.value, Some(json!(["before"])));
    }

    #[tokio::test]
    async fn exclusive_fetch_refuses_a_second_runner() {
        let store = store();
        let key = query_keys::leads_infinite(&Default::default(), 30);
        let second_ran = AtomicUsize::new(0);

        let first = store.fetch_exclusive(&key, async {
            tokio::task::yield_now().await;
            Ok(json!({"pages": [], "next_cursor": 0}))
        });
        let second = async {
            store
                .fetch_exclusive(&key, async {
                    second_ran.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(null))
                })
                .await
        };

        let (a, b) = tokio::join!(first, second);
        assert!(matches!(a, Some(Ok(_))));
        assert!(b.is_none());
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(&key).status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn cancel_in_flight_aborts_exclusive_fetch() {
        let store = Arc::new(store());
        let key = query_keys::scrapes_infinite(&Default::default(), 30);

        let task_store = Arc::clone(&store);
        let task_key = key.clone();
        let fetch = tokio::spawn(async move {
            task_store
                .fetch_exclusive(&task_key, async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!("late"))
                })
                .await
        });

        let mut reader = store.subscribe(&key);
        reader
            .wait_for(|entry| entry.status == EntryStatus::Fetching)
            .await
            .expect("fetch starts");
        assert_eq!(store.cancel_in_flight(&KeyMatcher::Exact(key.clone())), 1);

        let result = fetch.await.expect("task joins");
        assert!(matches!(result, Some(Err(SyncError::Cancelled))));
        assert_eq!(store.value(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_previous_value() {
        let store = store();
        let key = query_keys::batch_fetch_current();
        store.set(&key, json!({"status": "running"}));
        store.invalidate(&KeyMatcher::Exact(key.clone()));

        let result = store
            .fetch(&key, QueryOptions::default(), || async {
                Err(SyncError::http(502, "bad gateway"))
            })
            .await;
        assert!(matches!(result, Err(SyncError::Http { status: 502, .. })));

        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.value, Some(json!({"status": "running"})));
        assert!(entry.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let store = store();
        let key = query_keys::tags();
        let calls = AtomicUsize::new(0);

        let value = store
            .fetch(&key, QueryOptions::default(), || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(SyncError::http(500, "flaky"))
                    } else {
                        Ok(json!(["ok"]))
                    }
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, json!(["ok"]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let store = store();
        let key = query_keys::feed(404);
        let calls = AtomicUsize::new(0);

        let result = store
            .fetch(&key, QueryOptions::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::http(404, "Feed not found")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_spares_read_entries() {
        let store = store();
        let watched = query_keys::feeds();
        let idle = query_keys::tags();
        store.set(&watched, json!([]));
        store.set(&idle, json!([]));
        let _reader = store.subscribe(&watched);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(store.collect_garbage(), 1);
        assert_eq!(store.get(&idle).status, EntryStatus::Empty);
        assert_eq!(store.get(&watched).status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn observer_refetches_on_invalidation() {
        let store = Arc::new(store());
        let key = query_keys::feeds();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let mut observer = store.observe(key.clone(), QueryOptions::default(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!([n])) }
        });

        let first = observer
            .wait_for(|entry| entry.status == EntryStatus::Fresh)
            .await;
        assert_eq!(first.value, Some(json!([0])));

        store.invalidate(&KeyMatcher::Resource(ResourceType::Feeds));
        let second = observer
            .wait_for(|entry| entry.status == EntryStatus::Fresh && entry.value == Some(json!([1])))
            .await;
        assert_eq!(second.value, Some(json!([1])));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn update_applies_transform() {
        let store = store();
        let key = query_keys::tags();
        assert!(store.update(&key, |_| None).is_none());

        store.set(&key, json!([1, 2]));
        let next = store.update(&key, |current| {
            let mut items = current?.as_array()?.clone();
            items.push(json!(3));
            Some(Value::Array(items))
        });
        assert_eq!(next, Some(json!([1, 2, 3])));
    }

    #[test]
    fn decode_reads_typed_values() {
        let store = store();
        let key = query_keys::tags();
        store.set(&key, json!([{"id": 1, "name": "rust"}]));
        let tags: Vec<curator_api_types::Tag> = store
            .get(&key)
            .decode()
            .expect("decodes")
            .expect("present");
        assert_eq!(tags[0].name, "rust");
    }
}
