//! Cache key definitions.
//!
//! A [`CacheKey`] is the tuple `(resource, view, filters, cursor)`. The
//! `(resource, view)` pair names the logical query family, `filters` is the
//! canonical filter signature and `cursor` is the page offset for paginated
//! list reads. Keys compare by value, so two keys built from logically equal
//! inputs always address the same cache slot.

use std::collections::BTreeMap;
use std::fmt;

use url::form_urlencoded;

/// Backend resource family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Categories,
    Countries,
    Feeds,
    Tags,
    Leads,
    FetchLogs,
    InstagramFeeds,
    InstagramPosts,
    Subreddits,
    ElComercioFeeds,
    ElComercioPosts,
    DiarioCorreoFeeds,
    DiarioCorreoPosts,
    YoutubeFeeds,
    YoutubePosts,
    Scrapes,
    Approval,
    Translation,
    Dashboard,
    BatchFetch,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Countries => "countries",
            Self::Feeds => "feeds",
            Self::Tags => "tags",
            Self::Leads => "leads",
            Self::FetchLogs => "fetchLogs",
            Self::InstagramFeeds => "instagramFeeds",
            Self::InstagramPosts => "instagramPosts",
            Self::Subreddits => "subreddits",
            Self::ElComercioFeeds => "elComercioFeeds",
            Self::ElComercioPosts => "elComercioPosts",
            Self::DiarioCorreoFeeds => "diarioCorreoFeeds",
            Self::DiarioCorreoPosts => "diarioCorreoPosts",
            Self::YoutubeFeeds => "youtubeFeeds",
            Self::YoutubePosts => "youtubePosts",
            Self::Scrapes => "scrapes",
            Self::Approval => "approval",
            Self::Translation => "translation",
            Self::Dashboard => "dashboard",
            Self::BatchFetch => "batchFetch",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the read within a resource family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    /// The unfiltered collection (`GET /<resource>`).
    Collection,
    /// A single record; the id lives in the filter signature.
    Detail,
    /// Records scoped to a parent record (feed, category, tag).
    ByParent,
    /// A filtered, offset-paginated list page.
    List,
    /// An accumulating infinite list; the whole page sequence is one slot.
    Infinite,
    Pending,
    Stats,
    Current,
    Jobs,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "all",
            Self::Detail => "detail",
            Self::ByParent => "by",
            Self::List => "list",
            Self::Infinite => "infinite",
            Self::Pending => "pending",
            Self::Stats => "stats",
            Self::Current => "current",
            Self::Jobs => "jobs",
        }
    }
}

/// Canonical, order-independent encoding of a filter set.
///
/// Empty values are dropped on insert, so `{}` and `{search: ""}` produce the
/// same signature. Later inserts of the same name replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterSignature(BTreeMap<String, String>);

impl FilterSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |sig, (name, value)| sig.with(name, value))
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Query-string form, also used as the printable signature.
    pub fn encoded(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

/// Identifier of one logical query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: ResourceType,
    view: View,
    filters: FilterSignature,
    cursor: Option<u64>,
}

impl CacheKey {
    pub fn new(resource: ResourceType, view: View) -> Self {
        Self {
            resource,
            view,
            filters: FilterSignature::default(),
            cursor: None,
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterSignature) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Option<u64>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn filters(&self) -> &FilterSignature {
        &self.filters
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.view.as_str())?;
        if !self.filters.is_empty() {
            write!(f, "?{}", self.filters)?;
        }
        if let Some(cursor) = self.cursor {
            write!(f, "@{cursor}")?;
        }
        Ok(())
    }
}

/// Selects a set of cache keys for invalidation, cancellation and snapshots.
///
/// Matching is evaluated against the keys present at call time only; a matcher
/// is never retained as a standing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyMatcher {
    Exact(CacheKey),
    Resource(ResourceType),
    View(ResourceType, View),
}

impl KeyMatcher {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Self::Exact(exact) => exact == key,
            Self::Resource(resource) => key.resource == *resource,
            Self::View(resource, view) => key.resource == *resource && key.view == *view,
        }
    }
}

impl From<CacheKey> for KeyMatcher {
    fn from(key: CacheKey) -> Self {
        Self::Exact(key)
    }
}

impl From<ResourceType> for KeyMatcher {
    fn from(resource: ResourceType) -> Self {
        Self::Resource(resource)
    }
}

impl fmt::Display for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "{key}"),
            Self::Resource(resource) => write!(f, "{resource}/*"),
            Self::View(resource, view) => write!(f, "{resource}/{}/*", view.as_str()),
        }
    }
}
