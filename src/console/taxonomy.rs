//! Tags, categories and countries.

use curator_api_types::{Category, NamePayload, Tag};
use serde::Serialize;
use serde_json::{Value, json};

use crate::cache::{CacheKey, MutationTarget, ResourceType, query_keys};
use crate::error::SyncError;
use crate::mutation::MutationPlan;
use crate::mutation::transform::{append, remove_by_id};

use super::{Console, merge_record};

fn create_plan<T: Serialize + 'static>(
    resource: ResourceType,
    collection: CacheKey,
) -> MutationPlan<T> {
    MutationPlan::new(MutationTarget::write(resource))
        .affecting(collection)
        .merge(|_, value, record: &T| {
            serde_json::to_value(record)
                .ok()
                .and_then(|item| append(value, &item))
        })
}

fn update_plan<T: Serialize + 'static>(
    resource: ResourceType,
    collection: CacheKey,
    detail: CacheKey,
) -> MutationPlan<T> {
    MutationPlan::new(MutationTarget::write(resource))
        .affecting(collection)
        .affecting(detail)
        .merge(|_, value, record: &T| merge_record(value, record))
}

fn delete_plan(resource: ResourceType, collection: CacheKey, id: i64) -> MutationPlan<()> {
    MutationPlan::new(MutationTarget::write(resource))
        .affecting(collection)
        .speculate(move |_, value| remove_by_id(value, &json!(id)))
}

impl Console {
    // ========================================================================
    // Tags
    // ========================================================================

    pub async fn tags(&self) -> Result<Vec<Tag>, SyncError> {
        self.query(&query_keys::tags(), self.options(), || self.api.tags())
            .await
    }

    pub async fn tag(&self, id: i64) -> Result<Tag, SyncError> {
        self.query(&query_keys::tag(id), self.options(), || self.api.tag(id))
            .await
    }

    pub async fn feed_tags(&self, feed_id: i64) -> Result<Vec<Tag>, SyncError> {
        self.query(&query_keys::feed_tags(feed_id), self.options(), || {
            self.api.feed_tags(feed_id)
        })
        .await
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag, SyncError> {
        let payload = NamePayload {
            name: name.to_owned(),
        };
        let plan = create_plan(ResourceType::Tags, query_keys::tags());
        self.mutations
            .mutate(plan, self.api.create_tag(&payload))
            .await
    }

    pub async fn update_tag(&self, id: i64, name: &str) -> Result<Tag, SyncError> {
        let payload = NamePayload {
            name: name.to_owned(),
        };
        let plan = update_plan(ResourceType::Tags, query_keys::tags(), query_keys::tag(id));
        self.mutations
            .mutate(plan, self.api.update_tag(id, &payload))
            .await
    }

    pub async fn delete_tag(&self, id: i64) -> Result<(), SyncError> {
        let plan = delete_plan(ResourceType::Tags, query_keys::tags(), id);
        self.mutations.mutate(plan, self.api.delete_tag(id)).await
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn categories(&self) -> Result<Vec<Category>, SyncError> {
        self.query(&query_keys::categories(), self.options(), || {
            self.api.categories()
        })
        .await
    }

    pub async fn category(&self, id: i64) -> Result<Category, SyncError> {
        self.query(&query_keys::category(id), self.options(), || {
            self.api.category(id)
        })
        .await
    }

    pub async fn create_category(&self, name: &str) -> Result<Category, SyncError> {
        let payload = NamePayload {
            name: name.to_owned(),
        };
        let plan = create_plan(ResourceType::Categories, query_keys::categories());
        self.mutations
            .mutate(plan, self.api.create_category(&payload))
            .await
    }

    pub async fn update_category(&self, id: i64, name: &str) -> Result<Category, SyncError> {
        let payload = NamePayload {
            name: name.to_owned(),
        };
        let plan = update_plan(
            ResourceType::Categories,
            query_keys::categories(),
            query_keys::category(id),
        );
        self.mutations
            .mutate(plan, self.api.update_category(id, &payload))
            .await
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), SyncError> {
        let plan = delete_plan(ResourceType::Categories, query_keys::categories(), id);
        self.mutations
            .mutate(plan, self.api.delete_category(id))
            .await
    }

    pub async fn countries(&self) -> Result<Value, SyncError> {
        self.query(&query_keys::countries(), self.options(), || {
            self.api.countries()
        })
        .await
    }
}
