use curator_api_types::{Feed, FeedCreate, FeedUpdate};
use serde_json::{Value, json};

use crate::cache::{MutationTarget, ResourceType, query_keys};
use crate::error::SyncError;
use crate::mutation::MutationPlan;
use crate::mutation::transform::{append, patch_by_id, remove_by_id};

use super::{Console, merge_record};

impl Console {
    pub async fn feeds(&self) -> Result<Vec<Feed>, SyncError> {
        self.query(&query_keys::feeds(), self.options(), || self.api.feeds())
            .await
    }

    pub async fn feed(&self, id: i64) -> Result<Feed, SyncError> {
        self.query(&query_keys::feed(id), self.options(), || self.api.feed(id))
            .await
    }

    pub async fn feeds_by_category(&self, category_id: i64) -> Result<Vec<Feed>, SyncError> {
        self.query(
            &query_keys::feeds_by_category(category_id),
            self.options(),
            || self.api.feeds_by_category(category_id),
        )
        .await
    }

    pub async fn fetch_logs(&self, feed_id: Option<i64>) -> Result<Value, SyncError> {
        self.query(
            &query_keys::fetch_logs_list(feed_id, None),
            self.options(),
            || self.api.fetch_logs(feed_id),
        )
        .await
    }

    /// Create a feed; the server record is appended to the cached list.
    pub async fn create_feed(&self, payload: &FeedCreate) -> Result<Feed, SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Feeds))
            .affecting(query_keys::feeds())
            .merge(|_, value, feed: &Feed| {
                serde_json::to_value(feed)
                    .ok()
                    .and_then(|item| append(value, &item))
            });
        self.mutations
            .mutate(plan, self.api.create_feed(payload))
            .await
    }

    pub async fn update_feed(&self, id: i64, payload: &FeedUpdate) -> Result<Feed, SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Feeds))
            .affecting(query_keys::feeds())
            .affecting(query_keys::feed(id))
            .merge(|_, value, feed: &Feed| merge_record(value, feed));
        self.mutations
            .mutate(plan, self.api.update_feed(id, payload))
            .await
    }

    /// Flip a feed's active flag, showing the new state before the server answers.
    pub async fn set_feed_active(&self, id: i64, active: bool) -> Result<Feed, SyncError> {
        let patch = json!({ "is_active": i64::from(active) });
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Feeds))
            .affecting(query_keys::feeds())
            .affecting(query_keys::feed(id))
            .speculate(move |_, value| {
                patch_by_id(value, &json!(id), &patch).or_else(|| {
                    let mut detail = value.as_object()?.clone();
                    detail.insert("is_active".to_owned(), patch["is_active"].clone());
                    Some(Value::Object(detail))
                })
            })
            .merge(|_, value, feed: &Feed| merge_record(value, feed));
        self.mutations
            .mutate(plan, self.api.set_feed_active(id, active))
            .await
    }

    /// Delete a feed, removing it from the cached list immediately.
    pub async fn delete_feed(&self, id: i64) -> Result<(), SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Feeds))
            .affecting(query_keys::feeds())
            .speculate(move |_, value| remove_by_id(value, &json!(id)));
        self.mutations.mutate(plan, self.api.delete_feed(id)).await
    }

    pub async fn fetch_feed(&self, id: i64) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::ingest(ResourceType::Feeds));
        self.mutations.mutate(plan, self.api.fetch_feed(id)).await
    }

    pub async fn fetch_all_feeds(&self) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::ingest(ResourceType::Feeds));
        self.mutations
            .mutate(plan, self.api.fetch_all_feeds())
            .await
    }
}
