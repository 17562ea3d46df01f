//! Per-resource endpoints of the content API.
//!
//! Reads return raw JSON for the cache; writes return the typed record the
//! server echoes back.

use curator_api_types::{
    ApprovalRequest, BatchApprovalRequest, BatchApprovalResult, Category, ContentType, Feed,
    FeedCreate, FeedUpdate, JobSnapshot, NamePayload, StartBatchFetch, Tag,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::cache::FilterSignature;
use crate::cache::query_keys::{Channel, LeadFilters, PostFilters, ScrapeFilters};
use crate::error::SyncError;

use super::ApiClient;

fn to_body<T: Serialize>(payload: &T) -> Result<Option<Value>, SyncError> {
    Ok(Some(serde_json::to_value(payload)?))
}

/// Query pairs for a filter signature plus optional paging.
fn list_query(
    filters: &FilterSignature,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Vec<(&str, String)> {
    let mut query: Vec<(&str, String)> = filters
        .iter()
        .map(|(name, value)| (name, value.to_owned()))
        .collect();
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    if let Some(offset) = offset {
        query.push(("offset", offset.to_string()));
    }
    query
}

impl ApiClient {
    // ========================================================================
    // Categories and countries
    // ========================================================================

    pub async fn categories(&self) -> Result<Value, SyncError> {
        self.get("categories", &[]).await
    }

    pub async fn category(&self, id: i64) -> Result<Value, SyncError> {
        self.get(&format!("categories/{id}"), &[]).await
    }

    pub async fn create_category(&self, payload: &NamePayload) -> Result<Category, SyncError> {
        self.request(Method::POST, "categories", &[], to_body(payload)?)
            .await
    }

    pub async fn update_category(
        &self,
        id: i64,
        payload: &NamePayload,
    ) -> Result<Category, SyncError> {
        self.request(Method::PUT, &format!("categories/{id}"), &[], to_body(payload)?)
            .await
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("categories/{id}"), &[], None)
            .await
    }

    pub async fn countries(&self) -> Result<Value, SyncError> {
        self.get("countries", &[]).await
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    pub async fn feeds(&self) -> Result<Value, SyncError> {
        self.get("feeds", &[]).await
    }

    pub async fn feed(&self, id: i64) -> Result<Value, SyncError> {
        self.get(&format!("feeds/{id}"), &[]).await
    }

    pub async fn feeds_by_category(&self, category_id: i64) -> Result<Value, SyncError> {
        self.get(&format!("feeds/category/{category_id}"), &[]).await
    }

    pub async fn create_feed(&self, payload: &FeedCreate) -> Result<Feed, SyncError> {
        self.request(Method::POST, "feeds", &[], to_body(payload)?)
            .await
    }

    pub async fn update_feed(&self, id: i64, payload: &FeedUpdate) -> Result<Feed, SyncError> {
        self.request(Method::PUT, &format!("feeds/{id}"), &[], to_body(payload)?)
            .await
    }

    pub async fn set_feed_active(&self, id: i64, active: bool) -> Result<Feed, SyncError> {
        let action = if active { "activate" } else { "deactivate" };
        self.request(Method::PATCH, &format!("feeds/{id}/{action}"), &[], None)
            .await
    }

    pub async fn delete_feed(&self, id: i64) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("feeds/{id}"), &[], None)
            .await
    }

    /// Pull new entries for one feed.
    pub async fn fetch_feed(&self, id: i64) -> Result<Value, SyncError> {
        self.request(Method::POST, &format!("feeds/{id}/fetch"), &[], None)
            .await
    }

    pub async fn fetch_all_feeds(&self) -> Result<Value, SyncError> {
        self.request(Method::POST, "feeds/fetch-all", &[], None)
            .await
    }

    pub async fn fetch_logs(&self, feed_id: Option<i64>) -> Result<Value, SyncError> {
        match feed_id {
            Some(feed_id) => self.get(&format!("logs/feed/{feed_id}"), &[]).await,
            None => self.get("logs", &[]).await,
        }
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub async fn tags(&self) -> Result<Value, SyncError> {
        self.get("tags", &[]).await
    }

    pub async fn tag(&self, id: i64) -> Result<Value, SyncError> {
        self.get(&format!("tags/{id}"), &[]).await
    }

    pub async fn feed_tags(&self, feed_id: i64) -> Result<Value, SyncError> {
        self.get(&format!("tags/feeds/{feed_id}/tags"), &[]).await
    }

    pub async fn create_tag(&self, payload: &NamePayload) -> Result<Tag, SyncError> {
        self.request(Method::POST, "tags", &[], to_body(payload)?)
            .await
    }

    pub async fn update_tag(&self, id: i64, payload: &NamePayload) -> Result<Tag, SyncError> {
        self.request(Method::PUT, &format!("tags/{id}"), &[], to_body(payload)?)
            .await
    }

    pub async fn delete_tag(&self, id: i64) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("tags/{id}"), &[], None)
            .await
    }

    // ========================================================================
    // Leads and scrapes
    // ========================================================================

    pub async fn leads(
        &self,
        filters: &LeadFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        let signature = filters.signature();
        self.get("leads", &list_query(&signature, limit, offset))
            .await
    }

    pub async fn lead(&self, id: i64) -> Result<Value, SyncError> {
        self.get(&format!("leads/{id}"), &[]).await
    }

    pub async fn delete_lead(&self, id: i64) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("leads/{id}"), &[], None)
            .await
    }

    /// Translate pending leads, optionally for one feed.
    pub async fn translate_leads(
        &self,
        feed_id: Option<i64>,
        limit: Option<u64>,
    ) -> Result<Value, SyncError> {
        let signature = FilterSignature::new().with_opt("feed_id", feed_id);
        self.request(
            Method::POST,
            "translate/leads",
            &list_query(&signature, limit, None),
            None,
        )
        .await
    }

    pub async fn translation_stats(&self) -> Result<Value, SyncError> {
        self.get("translate/stats", &[]).await
    }

    pub async fn scrapes(
        &self,
        filters: &ScrapeFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        let signature = filters.signature();
        self.get("scrapes", &list_query(&signature, limit, offset))
            .await
    }

    // ========================================================================
    // Channels and subreddits
    // ========================================================================

    pub async fn channel_feeds(&self, channel: Channel) -> Result<Value, SyncError> {
        self.get(&format!("{}-feeds", channel.slug()), &[]).await
    }

    pub async fn create_channel_feed(
        &self,
        channel: Channel,
        payload: &Value,
    ) -> Result<Value, SyncError> {
        self.request(
            Method::POST,
            &format!("{}-feeds", channel.slug()),
            &[],
            Some(payload.clone()),
        )
        .await
    }

    pub async fn delete_channel_feed(&self, channel: Channel, id: i64) -> Result<(), SyncError> {
        let path = format!("{}-feeds/{id}", channel.slug());
        self.request_unit(Method::DELETE, &path, &[], None).await
    }

    /// Pull new posts for one feed of `channel`, or for all of them.
    pub async fn fetch_channel_feeds(
        &self,
        channel: Channel,
        id: Option<i64>,
    ) -> Result<Value, SyncError> {
        let path = match id {
            Some(id) => format!("{}-feeds/{id}/fetch", channel.slug()),
            None => format!("{}-feeds/fetch-all", channel.slug()),
        };
        self.request(Method::POST, &path, &[], None).await
    }

    pub async fn channel_posts(
        &self,
        channel: Channel,
        filters: &PostFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        let signature = filters.signature(channel);
        self.get(
            &format!("{}-posts", channel.slug()),
            &list_query(&signature, limit, offset),
        )
        .await
    }

    pub async fn delete_channel_post(&self, channel: Channel, id: i64) -> Result<(), SyncError> {
        let path = format!("{}-posts/{id}", channel.slug());
        self.request_unit(Method::DELETE, &path, &[], None).await
    }

    pub async fn subreddits(&self) -> Result<Value, SyncError> {
        self.get("subreddits", &[]).await
    }

    pub async fn create_subreddit(&self, payload: &Value) -> Result<Value, SyncError> {
        self.request(Method::POST, "subreddits", &[], Some(payload.clone()))
            .await
    }

    pub async fn delete_subreddit(&self, id: i64) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("subreddits/{id}"), &[], None)
            .await
    }

    // ========================================================================
    // Approval
    // ========================================================================

    pub async fn approval_pending(
        &self,
        content_type: Option<ContentType>,
    ) -> Result<Value, SyncError> {
        let query: Vec<(&str, String)> = content_type
            .map(|content_type| ("content_type", content_type.as_str().to_owned()))
            .into_iter()
            .collect();
        self.get("approval/pending", &query).await
    }

    pub async fn approval_stats(&self) -> Result<Value, SyncError> {
        self.get("approval/stats", &[]).await
    }

    /// Record one approve or reject decision.
    pub async fn decide(&self, decision: &ApprovalRequest) -> Result<Value, SyncError> {
        self.request(Method::POST, "approval/approve", &[], to_body(decision)?)
            .await
    }

    pub async fn batch_approve(
        &self,
        batch: &BatchApprovalRequest,
    ) -> Result<BatchApprovalResult, SyncError> {
        self.request(Method::POST, "approval/approve/batch", &[], to_body(batch)?)
            .await
    }

    // ========================================================================
    // Batch fetch jobs
    // ========================================================================

    /// The most recent job, or `null` when none ever ran.
    pub async fn batch_fetch_current(&self) -> Result<Value, SyncError> {
        self.get("batch-fetch/current", &[]).await
    }

    pub async fn batch_fetch_jobs(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        self.get(
            "batch-fetch/jobs",
            &list_query(&FilterSignature::new(), limit, offset),
        )
        .await
    }

    pub async fn batch_fetch_job(&self, id: i64) -> Result<Value, SyncError> {
        self.get(&format!("batch-fetch/jobs/{id}"), &[]).await
    }

    pub async fn start_batch_fetch(&self, force: bool) -> Result<JobSnapshot, SyncError> {
        self.request(
            Method::POST,
            "batch-fetch/start",
            &[],
            to_body(&StartBatchFetch { force })?,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_appends_paging_after_filters() {
        let filters = LeadFilters {
            search: Some("peru".to_owned()),
            ..LeadFilters::default()
        };
        let signature = filters.signature();
        let query = list_query(&signature, Some(30), Some(60));
        assert_eq!(
            query,
            vec![
                ("search", "peru".to_owned()),
                ("limit", "30".to_owned()),
                ("offset", "60".to_owned()),
            ]
        );
    }
}
