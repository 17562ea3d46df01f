//! Query key registry.
//!
//! One constructor per logical query of the console. Pages and the
//! coordinator never assemble keys by hand, so two call sites asking for the
//! same data always land on the same slot.

use curator_api_types::ContentType;

use super::keys::{CacheKey, FilterSignature, ResourceType, View};

/// Filters accepted by the leads list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilters {
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub country: Option<String>,
    pub feed_id: Option<i64>,
    pub sort: Option<String>,
}

impl LeadFilters {
    pub fn signature(&self) -> FilterSignature {
        FilterSignature::new()
            .with_opt("search", self.search.as_deref())
            .with_opt("category", self.category.as_deref())
            .with_opt("tag", self.tag.as_deref())
            .with_opt("country", self.country.as_deref())
            .with_opt("feed_id", self.feed_id)
            .with_opt("sort", self.sort.as_deref())
    }
}

/// Filters accepted by the unified scrapes endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeFilters {
    pub search: Option<String>,
    pub content_type: Option<String>,
    pub approval_status: Option<String>,
    pub country: Option<String>,
}

impl ScrapeFilters {
    pub fn signature(&self) -> FilterSignature {
        FilterSignature::new()
            .with_opt("search", self.search.as_deref())
            .with_opt("content_type", self.content_type.as_deref())
            .with_opt("approval_status", self.approval_status.as_deref())
            .with_opt("country", self.country.as_deref())
    }
}

/// Social and press sources that keep their own feeds and posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Instagram,
    Youtube,
    ElComercio,
    DiarioCorreo,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Instagram,
        Channel::Youtube,
        Channel::ElComercio,
        Channel::DiarioCorreo,
    ];

    /// Path prefix of the channel's endpoints (`<slug>-feeds`, `<slug>-posts`).
    pub fn slug(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::ElComercio => "el-comercio",
            Self::DiarioCorreo => "diario-correo",
        }
    }

    pub fn feeds(self) -> ResourceType {
        match self {
            Self::Instagram => ResourceType::InstagramFeeds,
            Self::Youtube => ResourceType::YoutubeFeeds,
            Self::ElComercio => ResourceType::ElComercioFeeds,
            Self::DiarioCorreo => ResourceType::DiarioCorreoFeeds,
        }
    }

    pub fn posts(self) -> ResourceType {
        match self {
            Self::Instagram => ResourceType::InstagramPosts,
            Self::Youtube => ResourceType::YoutubePosts,
            Self::ElComercio => ResourceType::ElComercioPosts,
            Self::DiarioCorreo => ResourceType::DiarioCorreoPosts,
        }
    }

    /// Query parameter scoping posts to one of the channel's feeds.
    pub fn feed_filter(self) -> &'static str {
        match self {
            Self::Instagram => "instagram_feed_id",
            Self::Youtube => "youtube_feed_id",
            Self::ElComercio => "el_comercio_feed_id",
            Self::DiarioCorreo => "diario_correo_feed_id",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.slug() == value)
            .ok_or_else(|| format!("unknown channel `{value}`"))
    }
}

/// Filters accepted by the channel post endpoints. Channels ignore the ones
/// they do not support.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilters {
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub country: Option<String>,
    pub approval_status: Option<String>,
    pub feed_id: Option<i64>,
}

impl PostFilters {
    pub fn signature(&self, channel: Channel) -> FilterSignature {
        FilterSignature::new()
            .with_opt("search", self.search.as_deref())
            .with_opt("category", self.category.as_deref())
            .with_opt("tag", self.tag.as_deref())
            .with_opt("country", self.country.as_deref())
            .with_opt("approval_status", self.approval_status.as_deref())
            .with_opt(channel.feed_filter(), self.feed_id)
    }
}

fn by_id(resource: ResourceType, view: View, id: i64) -> CacheKey {
    CacheKey::new(resource, view).with_filters(FilterSignature::new().with("id", id))
}

pub fn categories() -> CacheKey {
    CacheKey::new(ResourceType::Categories, View::Collection)
}

pub fn category(id: i64) -> CacheKey {
    by_id(ResourceType::Categories, View::Detail, id)
}

pub fn countries() -> CacheKey {
    CacheKey::new(ResourceType::Countries, View::Collection)
}

pub fn feeds() -> CacheKey {
    CacheKey::new(ResourceType::Feeds, View::Collection)
}

pub fn feed(id: i64) -> CacheKey {
    by_id(ResourceType::Feeds, View::Detail, id)
}

pub fn feeds_by_category(category_id: i64) -> CacheKey {
    CacheKey::new(ResourceType::Feeds, View::ByParent)
        .with_filters(FilterSignature::new().with("category_id", category_id))
}

pub fn tags() -> CacheKey {
    CacheKey::new(ResourceType::Tags, View::Collection)
}

pub fn tag(id: i64) -> CacheKey {
    by_id(ResourceType::Tags, View::Detail, id)
}

pub fn feed_tags(feed_id: i64) -> CacheKey {
    CacheKey::new(ResourceType::Tags, View::ByParent)
        .with_filters(FilterSignature::new().with("feed_id", feed_id))
}

pub fn lead(id: i64) -> CacheKey {
    by_id(ResourceType::Leads, View::Detail, id)
}

/// One offset page of the leads list; `limit` is part of the signature.
pub fn leads_list(filters: &LeadFilters, limit: Option<u64>, offset: Option<u64>) -> CacheKey {
    CacheKey::new(ResourceType::Leads, View::List)
        .with_filters(filters.signature().with_opt("limit", limit))
        .with_cursor(offset)
}

pub fn leads_infinite(filters: &LeadFilters, page_size: u64) -> CacheKey {
    CacheKey::new(ResourceType::Leads, View::Infinite)
        .with_filters(filters.signature().with("limit", page_size))
}

pub fn fetch_logs_list(feed_id: Option<i64>, status: Option<&str>) -> CacheKey {
    CacheKey::new(ResourceType::FetchLogs, View::List).with_filters(
        FilterSignature::new()
            .with_opt("feed_id", feed_id)
            .with_opt("status", status),
    )
}

pub fn scrapes_list(filters: &ScrapeFilters, limit: Option<u64>, offset: Option<u64>) -> CacheKey {
    CacheKey::new(ResourceType::Scrapes, View::List)
        .with_filters(filters.signature().with_opt("limit", limit))
        .with_cursor(offset)
}

pub fn scrapes_infinite(filters: &ScrapeFilters, page_size: u64) -> CacheKey {
    CacheKey::new(ResourceType::Scrapes, View::Infinite)
        .with_filters(filters.signature().with("limit", page_size))
}

pub fn subreddits() -> CacheKey {
    CacheKey::new(ResourceType::Subreddits, View::Collection)
}

pub fn channel_feeds(channel: Channel) -> CacheKey {
    CacheKey::new(channel.feeds(), View::Collection)
}

pub fn channel_posts_list(
    channel: Channel,
    filters: &PostFilters,
    limit: Option<u64>,
    offset: Option<u64>,
) -> CacheKey {
    CacheKey::new(channel.posts(), View::List)
        .with_filters(filters.signature(channel).with_opt("limit", limit))
        .with_cursor(offset)
}

pub fn channel_posts_infinite(channel: Channel, filters: &PostFilters, page_size: u64) -> CacheKey {
    CacheKey::new(channel.posts(), View::Infinite)
        .with_filters(filters.signature(channel).with("limit", page_size))
}

/// Pending approval items; `None` is the cross-type `all` view.
pub fn approval_pending(content_type: Option<ContentType>) -> CacheKey {
    let scope = content_type.map_or("all", ContentType::as_str);
    CacheKey::new(ResourceType::Approval, View::Pending)
        .with_filters(FilterSignature::new().with("content_type", scope))
}

pub fn approval_stats() -> CacheKey {
    CacheKey::new(ResourceType::Approval, View::Stats)
}

pub fn translation_stats() -> CacheKey {
    CacheKey::new(ResourceType::Translation, View::Stats)
}

pub fn dashboard_stats() -> CacheKey {
    CacheKey::new(ResourceType::Dashboard, View::Stats)
}

pub fn batch_fetch_jobs(limit: Option<u64>, offset: Option<u64>) -> CacheKey {
    CacheKey::new(ResourceType::BatchFetch, View::Jobs)
        .with_filters(FilterSignature::new().with_opt("limit", limit))
        .with_cursor(offset)
}

pub fn batch_fetch_job(id: i64) -> CacheKey {
    by_id(ResourceType::BatchFetch, View::Detail, id)
}

pub fn batch_fetch_current() -> CacheKey {
    CacheKey::new(ResourceType::BatchFetch, View::Current)
}
