//! Social and press channels, plus the subreddit registry.
//!
//! Every channel has the same shape: a feed collection and a post list that
//! can be read as offset pages or as an endless list. Deleting a post removes
//! it from both list shapes at once.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::cache::query_keys::{self, Channel, PostFilters};
use crate::cache::{KeyMatcher, MutationTarget, ResourceType, View};
use crate::error::SyncError;
use crate::infinite::{InfiniteList, PageSource, Termination};
use crate::mutation::MutationPlan;
use crate::mutation::transform::{append, remove_by_id};

use super::Console;

pub const POSTS_PAGE_SIZE: u64 = 30;

/// Post endpoint of one channel bound to a filter set.
pub struct ChannelPosts {
    api: ApiClient,
    channel: Channel,
    filters: PostFilters,
}

#[async_trait]
impl PageSource for ChannelPosts {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError> {
        self.api
            .channel_posts(self.channel, &self.filters, Some(limit), Some(offset))
            .await
    }
}

impl Console {
    pub async fn channel_feeds(&self, channel: Channel) -> Result<Value, SyncError> {
        self.query(&query_keys::channel_feeds(channel), self.options(), || {
            self.api.channel_feeds(channel)
        })
        .await
    }

    /// Create a channel feed; the server record is appended to the cached list.
    pub async fn create_channel_feed(
        &self,
        channel: Channel,
        payload: &Value,
    ) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(channel.feeds()))
            .affecting(query_keys::channel_feeds(channel))
            .merge(|_, value, created: &Value| append(value, created));
        self.mutations
            .mutate(plan, self.api.create_channel_feed(channel, payload))
            .await
    }

    pub async fn delete_channel_feed(&self, channel: Channel, id: i64) -> Result<(), SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(channel.feeds()))
            .affecting(query_keys::channel_feeds(channel))
            .speculate(move |_, value| remove_by_id(value, &json!(id)));
        self.mutations
            .mutate(plan, self.api.delete_channel_feed(channel, id))
            .await
    }

    /// Pull new posts for one feed, or every feed when `id` is `None`.
    pub async fn fetch_channel_feeds(
        &self,
        channel: Channel,
        id: Option<i64>,
    ) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::ingest(channel.feeds()));
        self.mutations
            .mutate(plan, self.api.fetch_channel_feeds(channel, id))
            .await
    }

    pub async fn channel_posts(
        &self,
        channel: Channel,
        filters: &PostFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        self.query(
            &query_keys::channel_posts_list(channel, filters, limit, offset),
            self.options(),
            || self.api.channel_posts(channel, filters, limit, offset),
        )
        .await
    }

    /// Channel posts as an endless list; pages are bare arrays, so a short
    /// page ends it.
    pub fn channel_posts_infinite(
        &self,
        channel: Channel,
        filters: PostFilters,
    ) -> InfiniteList<ChannelPosts> {
        InfiniteList::new(
            self.store.clone(),
            query_keys::channel_posts_infinite(channel, &filters, POSTS_PAGE_SIZE),
            POSTS_PAGE_SIZE,
            Termination::Length,
            ChannelPosts {
                api: self.api.clone(),
                channel,
                filters,
            },
        )
    }

    pub async fn delete_channel_post(&self, channel: Channel, id: i64) -> Result<(), SyncError> {
        let posts = channel.posts();
        let plan = MutationPlan::new(MutationTarget::write(posts))
            .affecting(KeyMatcher::View(posts, View::List))
            .affecting(KeyMatcher::View(posts, View::Infinite))
            .speculate(move |_, value| remove_by_id(value, &json!(id)));
        self.mutations
            .mutate(plan, self.api.delete_channel_post(channel, id))
            .await
    }

    pub async fn subreddits(&self) -> Result<Value, SyncError> {
        self.query(&query_keys::subreddits(), self.options(), || {
            self.api.subreddits()
        })
        .await
    }

    pub async fn create_subreddit(&self, payload: &Value) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Subreddits))
            .affecting(query_keys::subreddits())
            .merge(|_, value, created: &Value| append(value, created));
        self.mutations
            .mutate(plan, self.api.create_subreddit(payload))
            .await
    }

    pub async fn delete_subreddit(&self, id: i64) -> Result<(), SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Subreddits))
            .affecting(query_keys::subreddits())
            .speculate(move |_, value| remove_by_id(value, &json!(id)));
        self.mutations
            .mutate(plan, self.api.delete_subreddit(id))
            .await
    }
}
