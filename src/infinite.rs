//! Infinite list accumulation.
//!
//! Pages are appended in fetch order under one cache key. The next cursor is
//! `pages * page_size`; exhaustion is decided by the resource's
//! [`Termination`] policy.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStore, EntryStatus, KeyMatcher};
use crate::error::SyncError;

/// How a paginated resource signals its last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A page shorter than the page size is the last one.
    Length,
    /// The server reports `total_count`; the list ends once the cursor reaches it.
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Next(u64),
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub cursor: u64,
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Accumulated pages of one list; this is the value cached under its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfiniteListState {
    pub pages: Vec<Page>,
    /// `None` once the list is exhausted.
    pub next_cursor: Option<u64>,
}

impl Default for InfiniteListState {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            next_cursor: Some(0),
        }
    }
}

impl InfiniteListState {
    pub fn cursor(&self) -> Cursor {
        self.next_cursor.map_or(Cursor::Done, Cursor::Next)
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_cursor.is_none()
    }

    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    /// Latest server-reported total, if the resource reports one.
    pub fn total_count(&self) -> Option<u64> {
        self.pages.iter().rev().find_map(|page| page.total_count)
    }

    fn has_page(&self, cursor: u64) -> bool {
        self.pages.iter().any(|page| page.cursor == cursor)
    }

    fn from_value(value: Option<Value>) -> Result<Self, SyncError> {
        match value {
            Some(value) => serde_json::from_value(value).map_err(SyncError::from),
            None => Ok(Self::default()),
        }
    }
}

/// One page as returned by the backend: a bare array or a counted envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub items: Vec<Value>,
    pub total_count: Option<u64>,
}

impl PageResponse {
    pub fn from_value(value: Value) -> Result<Self, SyncError> {
        match value {
            Value::Array(items) => Ok(Self {
                items,
                total_count: None,
            }),
            Value::Object(mut map) => {
                let items = match map.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => return Err(SyncError::decode("page response has no `items` array")),
                };
                let total_count = map.get("total_count").and_then(Value::as_u64);
                Ok(Self { items, total_count })
            }
            other => Err(SyncError::decode(format!(
                "unexpected page response: {other}"
            ))),
        }
    }
}

/// Backend access for one paginated resource.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError>;
}

#[async_trait]
impl<F, Fut> PageSource for F
where
    F: Fn(u64, u64) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, SyncError>> + Send,
{
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError> {
        self(offset, limit).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    Appended { cursor: u64, items: usize, next: Cursor },
    Exhausted,
    /// A fetch for the current cursor is already running.
    AlreadyInFlight,
    /// The list was reset or advanced while the page was loading.
    Superseded,
}

/// Accumulates the pages of one infinite query into the cache.
///
/// Page loads claim the store's in-flight slot for the key, so every handle
/// built over the same key shares one fetch at a time and
/// [`CacheStore::cancel_in_flight`] aborts a page mid-load.
pub struct InfiniteList<S> {
    store: Arc<CacheStore>,
    key: CacheKey,
    page_size: u64,
    termination: Termination,
    source: S,
}

impl<S: PageSource> InfiniteList<S> {
    pub fn new(
        store: Arc<CacheStore>,
        key: CacheKey,
        page_size: u64,
        termination: Termination,
        source: S,
    ) -> Self {
        Self {
            store,
            key,
            page_size: page_size.max(1),
            termination,
            source,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn state(&self) -> Result<InfiniteListState, SyncError> {
        InfiniteListState::from_value(self.store.value(&self.key))
    }

    /// Current state, loading what the cache cannot serve.
    ///
    /// A stale list refetches as many pages as it had loaded; a missing one
    /// loads its first page. A first page already loading through another
    /// handle is awaited rather than restarted.
    pub async fn load(&self) -> Result<InfiniteListState, SyncError> {
        let entry = self.store.get(&self.key);
        match entry.status {
            EntryStatus::Fresh | EntryStatus::Fetching | EntryStatus::Error
                if entry.value.is_some() =>
            {
                self.state()
            }
            EntryStatus::Fetching => {
                let mut updates = self.store.subscribe(&self.key);
                if updates
                    .wait_for(|entry| entry.status != EntryStatus::Fetching)
                    .await
                    .is_err()
                {
                    debug!(key = %self.key, "Infinite list removed while loading");
                }
                self.state()
            }
            EntryStatus::Stale if entry.value.is_some() => self.refetch().await,
            _ => self.refresh().await,
        }
    }

    /// Drop every page and fetch the first one again.
    pub async fn refresh(&self) -> Result<InfiniteListState, SyncError> {
        self.reset();
        self.fetch_next_page().await?;
        self.state()
    }

    /// Reload every loaded page from the first cursor.
    ///
    /// The old pages stay readable until the whole run lands in one write.
    /// Stops early when the list turns out shorter than before.
    pub async fn refetch(&self) -> Result<InfiniteListState, SyncError> {
        let loaded = self.state()?.pages.len().max(1);
        let work = async {
            let mut state = InfiniteListState::default();
            while state.pages.len() < loaded {
                let Some(cursor) = state.next_cursor else {
                    break;
                };
                let response = self.fetch_response(cursor).await?;
                self.append(&mut state, cursor, response);
            }
            Ok::<Value, SyncError>(serde_json::to_value(&state)?)
        };

        match self.store.fetch_exclusive(&self.key, work).await {
            None => {
                debug!(key = %self.key, "Refetch skipped; a page load is in flight");
                self.state()
            }
            Some(result) => {
                let state = InfiniteListState::from_value(Some(result?))?;
                info!(key = %self.key, pages = state.pages.len(), "Infinite list refetched");
                Ok(state)
            }
        }
    }

    /// Discard all pages and cursor state.
    pub fn reset(&self) {
        self.store.remove(&KeyMatcher::Exact(self.key.clone()));
        info!(key = %self.key, "Infinite list reset");
    }

    /// Fetch the page at the current cursor and append it.
    pub async fn fetch_next_page(&self) -> Result<NextPage, SyncError> {
        let Some(cursor) = self.state()?.next_cursor else {
            return Ok(NextPage::Exhausted);
        };

        let mut appended = None;
        let work = async {
            let response = self.fetch_response(cursor).await?;
            let mut state = self.state()?;
            if state.next_cursor != Some(cursor) || state.has_page(cursor) {
                debug!(key = %self.key, cursor, "Discarding page for superseded cursor");
                return Ok::<Value, SyncError>(serde_json::to_value(&state)?);
            }
            let items = self.append(&mut state, cursor, response);
            appended = Some((items, state.cursor()));
            Ok(serde_json::to_value(&state)?)
        };

        let outcome = self.store.fetch_exclusive(&self.key, work).await;
        match outcome {
            None => {
                debug!(key = %self.key, cursor, "Page fetch already in flight");
                Ok(NextPage::AlreadyInFlight)
            }
            Some(Err(SyncError::Cancelled)) => {
                debug!(key = %self.key, cursor, "Page fetch cancelled");
                Ok(NextPage::Superseded)
            }
            Some(Err(error)) => Err(error),
            Some(Ok(_)) => match appended {
                Some((items, next)) => {
                    info!(key = %self.key, cursor, items, next = ?next, "Page appended");
                    Ok(NextPage::Appended {
                        cursor,
                        items,
                        next,
                    })
                }
                None => Ok(NextPage::Superseded),
            },
        }
    }

    async fn fetch_response(&self, cursor: u64) -> Result<PageResponse, SyncError> {
        debug!(key = %self.key, cursor, limit = self.page_size, "Fetching page");
        PageResponse::from_value(self.source.fetch_page(cursor, self.page_size).await?)
    }

    /// Push `response` as the page at `cursor`; returns its item count.
    fn append(&self, state: &mut InfiniteListState, cursor: u64, response: PageResponse) -> usize {
        let items = response.items.len();
        state.next_cursor = self.next_cursor(state, &response);
        state.pages.push(Page {
            cursor,
            items: response.items,
            total_count: response.total_count,
        });
        items
    }

    /// Cursor after appending `response` to `state`.
    ///
    /// Under [`Termination::Count`] a page without `total_count` counts as a
    /// total of zero and ends the list.
    fn next_cursor(&self, state: &InfiniteListState, response: &PageResponse) -> Option<u64> {
        let returned = response.items.len() as u64;
        if returned < self.page_size {
            return None;
        }
        let next = (state.pages.len() as u64 + 1) * self.page_size;
        match self.termination {
            Termination::Count if next >= response.total_count.unwrap_or(0) => None,
            _ => Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;
    use crate::cache::{CacheConfig, query_keys};

    /// Serves `total` numbered items and records every requested offset.
    struct Numbers {
        total: u64,
        counted: bool,
        requested: StdMutex<Vec<u64>>,
    }

    impl Numbers {
        fn new(total: u64, counted: bool) -> Self {
            Self {
                total,
                counted,
                requested: StdMutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u64> {
            self.requested.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl PageSource for Numbers {
        async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError> {
            self.requested.lock().expect("lock").push(offset);
            tokio::task::yield_now().await;
            let end = (offset + limit).min(self.total);
            let items: Vec<Value> = (offset..end).map(|n| json!({"id": n})).collect();
            Ok(if self.counted {
                json!({"items": items, "total_count": self.total})
            } else {
                Value::Array(items)
            })
        }
    }

    fn list(source: Numbers, termination: Termination) -> InfiniteList<Numbers> {
        list_in(Arc::new(CacheStore::new(CacheConfig::default())), source, termination)
    }

    fn list_in(store: Arc<CacheStore>, source: Numbers, termination: Termination) -> InfiniteList<Numbers> {
        InfiniteList::new(
            store,
            query_keys::leads_infinite(&Default::default(), 30),
            30,
            termination,
            source,
        )
    }

    #[tokio::test]
    async fn length_policy_requests_strictly_increasing_offsets() {
        let list = list(Numbers::new(75, false), Termination::Length);
        while let NextPage::Appended { .. } = list.fetch_next_page().await.expect("page") {}

        assert_eq!(list.source.requested(), vec![0, 30, 60]);
        let state = list.state().expect("state");
        assert!(state.is_exhausted());
        assert_eq!(state.item_count(), 75);
        assert_eq!(list.fetch_next_page().await.expect("done"), NextPage::Exhausted);
    }

    #[tokio::test]
    async fn length_policy_needs_a_short_page_to_stop() {
        let list = list(Numbers::new(60, false), Termination::Length);
        while let NextPage::Appended { .. } = list.fetch_next_page().await.expect("page") {}
        assert_eq!(list.source.requested(), vec![0, 30, 60]);
        assert_eq!(list.state().expect("state").pages.last().map(|p| p.items.len()), Some(0));
    }

    #[tokio::test]
    async fn count_policy_stops_at_reported_total() {
        let list = list(Numbers::new(45, true), Termination::Count);

        let first = list.fetch_next_page().await.expect("first");
        assert_eq!(
            first,
            NextPage::Appended {
                cursor: 0,
                items: 30,
                next: Cursor::Next(30)
            }
        );
        let second = list.fetch_next_page().await.expect("second");
        assert_eq!(
            second,
            NextPage::Appended {
                cursor: 30,
                items: 15,
                next: Cursor::Done
            }
        );
        assert_eq!(list.state().expect("state").cursor(), Cursor::Done);
        assert_eq!(list.state().expect("state").total_count(), Some(45));
    }

    #[tokio::test]
    async fn count_policy_stops_on_exact_multiple_without_extra_request() {
        let list = list(Numbers::new(60, true), Termination::Count);
        while let NextPage::Appended { .. } = list.fetch_next_page().await.expect("page") {}
        assert_eq!(list.source.requested(), vec![0, 30]);
    }

    #[tokio::test]
    async fn count_policy_without_total_ends_the_list() {
        let list = list(Numbers::new(90, false), Termination::Count);
        let first = list.fetch_next_page().await.expect("first");
        assert_eq!(
            first,
            NextPage::Appended {
                cursor: 0,
                items: 30,
                next: Cursor::Done
            }
        );
        assert_eq!(list.fetch_next_page().await.expect("done"), NextPage::Exhausted);
        assert_eq!(list.source.requested(), vec![0]);
    }

    #[tokio::test]
    async fn concurrent_calls_fetch_each_cursor_once() {
        let list = list(Numbers::new(90, false), Termination::Length);
        let (a, b) = tokio::join!(list.fetch_next_page(), list.fetch_next_page());
        let outcomes = [a.expect("a"), b.expect("b")];

        assert!(outcomes.contains(&NextPage::AlreadyInFlight));
        assert_eq!(list.source.requested(), vec![0]);
        assert_eq!(list.state().expect("state").pages.len(), 1);
    }

    #[tokio::test]
    async fn handles_on_one_key_share_the_in_flight_page() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let a = list_in(Arc::clone(&store), Numbers::new(90, false), Termination::Length);
        let b = list_in(Arc::clone(&store), Numbers::new(90, false), Termination::Length);

        let (first, second) = tokio::join!(a.fetch_next_page(), b.fetch_next_page());
        assert!(matches!(first.expect("a"), NextPage::Appended { cursor: 0, .. }));
        assert_eq!(second.expect("b"), NextPage::AlreadyInFlight);
        assert_eq!(a.source.requested(), vec![0]);
        assert!(b.source.requested().is_empty());

        let state = b.state().expect("shared state");
        assert_eq!(state.pages.len(), 1);
        assert_eq!(state.next_cursor, Some(30));
    }

    #[tokio::test]
    async fn cancelling_the_key_supersedes_a_loading_page() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let list = InfiniteList::new(
            Arc::clone(&store),
            query_keys::leads_infinite(&Default::default(), 30),
            30,
            Termination::Length,
            |_offset: u64, _limit: u64| futures::future::pending::<Result<Value, SyncError>>(),
        );
        let canceller = async {
            tokio::task::yield_now().await;
            store.cancel_in_flight(&KeyMatcher::Exact(list.key().clone()))
        };

        let (outcome, cancelled) = tokio::join!(list.fetch_next_page(), canceller);
        assert_eq!(cancelled, 1);
        assert_eq!(outcome.expect("outcome"), NextPage::Superseded);
        assert!(list.state().expect("state").pages.is_empty());
    }

    #[tokio::test]
    async fn concurrent_loads_share_the_first_page() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let a = list_in(Arc::clone(&store), Numbers::new(90, false), Termination::Length);
        let b = list_in(Arc::clone(&store), Numbers::new(90, false), Termination::Length);

        let (first, second) = tokio::join!(a.load(), b.load());
        assert_eq!(first.expect("a"), second.expect("b"));
        assert_eq!(a.source.requested(), vec![0]);
        assert!(b.source.requested().is_empty());
    }

    #[tokio::test]
    async fn stale_load_refetches_every_loaded_page() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let list = list_in(Arc::clone(&store), Numbers::new(90, false), Termination::Length);
        list.fetch_next_page().await.expect("first");
        list.fetch_next_page().await.expect("second");

        store.invalidate(&KeyMatcher::Exact(list.key().clone()));
        let state = list.load().await.expect("load");

        assert_eq!(state.pages.len(), 2);
        assert_eq!(state.next_cursor, Some(60));
        assert_eq!(list.source.requested(), vec![0, 30, 0, 30]);
        assert_eq!(store.get(list.key()).status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn fresh_load_serves_cached_pages() {
        let list = list(Numbers::new(90, false), Termination::Length);
        list.fetch_next_page().await.expect("first");
        list.fetch_next_page().await.expect("second");

        let state = list.load().await.expect("load");
        assert_eq!(state.pages.len(), 2);
        assert_eq!(list.source.requested(), vec![0, 30]);
    }

    #[tokio::test]
    async fn refresh_starts_over() {
        let list = list(Numbers::new(90, false), Termination::Length);
        list.fetch_next_page().await.expect("first");
        list.fetch_next_page().await.expect("second");

        let state = list.refresh().await.expect("refresh");
        assert_eq!(state.pages.len(), 1);
        assert_eq!(state.next_cursor, Some(30));
        assert_eq!(list.source.requested(), vec![0, 30, 0]);
    }

    #[tokio::test]
    async fn failed_page_leaves_state_untouched() {
        let store = Arc::new(CacheStore::new(CacheConfig::default()));
        let key = query_keys::scrapes_infinite(&Default::default(), 2);
        let list = InfiniteList::new(Arc::clone(&store), key, 2, Termination::Count, |offset: u64, _limit: u64| async move {
            if offset == 0 {
                Ok(json!({"items": [{"id": 1}, {"id": 2}], "total_count": 5}))
            } else {
                Err(SyncError::network("offline"))
            }
        });

        list.fetch_next_page().await.expect("first page");
        let before = list.state().expect("state");
        assert!(list.fetch_next_page().await.is_err());
        assert_eq!(list.state().expect("state"), before);
        assert_eq!(before.next_cursor, Some(2));
        assert_eq!(store.get(list.key()).status, EntryStatus::Error);
        assert_eq!(list.load().await.expect("cached pages"), before);
    }

    #[test]
    fn page_response_accepts_both_shapes() {
        let bare = PageResponse::from_value(json!([1, 2])).expect("bare");
        assert_eq!(bare.total_count, None);
        let counted = PageResponse::from_value(json!({"items": [1], "total_count": 9})).expect("counted");
        assert_eq!(counted.total_count, Some(9));
        assert!(PageResponse::from_value(json!(3)).is_err());
    }
}
