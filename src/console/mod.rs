//! The console context: every piece of shared client state, constructed once
//! and handed to consumers.
//!
//! Per-resource queries and mutations live in the submodules and are exposed
//! as methods on [`Console`]. Queries read through the cache store; writes go
//! through the mutation coordinator so speculative updates, rollback and
//! invalidation behave the same for every resource.

mod approval;
mod dashboard;
mod feeds;
mod jobs;
mod leads;
mod social;
mod taxonomy;

pub use leads::{LEADS_PAGE_SIZE, LeadPages, SCRAPES_PAGE_SIZE, ScrapePages};
pub use social::{ChannelPosts, POSTS_PAGE_SIZE};

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{ApiClient, HttpAuthBackend};
use crate::cache::{CacheConfig, CacheKey, CacheStore, InvalidationGraph, QueryOptions};
use crate::config::Settings;
use crate::dialog::DialogQueue;
use crate::error::SyncError;
use crate::mutation::MutationCoordinator;
use crate::mutation::transform::{item_id, replace_by_id};
use crate::polling::{PollingConfig, PollingMonitor};
use crate::session::{FileSessionStore, SessionManager, SystemClock};

#[derive(Clone)]
pub struct Console {
    api: ApiClient,
    store: Arc<CacheStore>,
    mutations: MutationCoordinator,
    polling: PollingMonitor,
    polling_config: PollingConfig,
    session: SessionManager,
    dialogs: Arc<DialogQueue>,
}

impl Console {
    /// Wire the console against the configured backends.
    pub fn new(settings: &Settings) -> Result<Self, SyncError> {
        let session = SessionManager::new(
            Arc::new(HttpAuthBackend::new(&settings.api.auth_url)?),
            Arc::new(FileSessionStore::in_dir(settings.state_dir())),
            Arc::new(SystemClock),
            settings.session.expiry_buffer(),
        );

        let mut api = ApiClient::new(&settings.api.base_url)?;
        if settings.api.attach_session_token {
            api = api.with_session(session.clone());
        }

        Ok(Self::from_parts(
            api,
            session,
            settings.cache.clone(),
            settings.polling.clone(),
        ))
    }

    pub fn from_parts(
        api: ApiClient,
        session: SessionManager,
        cache: CacheConfig,
        polling: PollingConfig,
    ) -> Self {
        let store = Arc::new(CacheStore::new(cache));
        let mutations =
            MutationCoordinator::new(Arc::clone(&store), Arc::new(InvalidationGraph::standard()));
        Self {
            api,
            polling: PollingMonitor::new(Arc::clone(&store)),
            store,
            mutations,
            polling_config: polling,
            session,
            dialogs: Arc::new(DialogQueue::new()),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn dialogs(&self) -> &Arc<DialogQueue> {
        &self.dialogs
    }

    /// Sign out and drop every cached resource.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.store.clear();
    }

    fn options(&self) -> QueryOptions {
        self.store.default_options()
    }

    /// Read `key` through the cache and decode it.
    async fn query<T, F, Fut>(
        &self,
        key: &CacheKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        let value = self.store.ensure(key, options, fetcher).await?;
        serde_json::from_value(value).map_err(SyncError::from)
    }
}

/// Merge a server record into a cached collection or detail value.
fn merge_record<T: Serialize>(value: &Value, record: &T) -> Option<Value> {
    let record = serde_json::to_value(record).ok()?;
    replace_by_id(value, &record).or_else(|| {
        (item_id(value).is_some() && item_id(value) == item_id(&record)).then_some(record)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_record_replaces_collection_items_and_details() {
        let record = json!({"id": 2, "name": "beta"});
        assert_eq!(
            merge_record(&json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]), &record),
            Some(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "beta"}]))
        );
        assert_eq!(
            merge_record(&json!({"id": 2, "name": "b"}), &record),
            Some(record.clone())
        );
        assert_eq!(merge_record(&json!({"id": 3, "name": "c"}), &record), None);
    }
}
