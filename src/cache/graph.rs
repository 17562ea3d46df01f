//! Declarative invalidation graph.
//!
//! Maps each mutation target to the key families that must be refetched once
//! a mutation on it settles, and keeps the reverse mapping so a dependent
//! family can list every write that refreshes it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::keys::{KeyMatcher, ResourceType, View};
use super::query_keys::Channel;

/// What a mutation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Create, update, delete or toggle records.
    Write,
    /// Pull new content from upstream sources (feed fetch, batch fetch).
    Ingest,
    /// Derive annotations on existing records (translation, language detection).
    Annotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationTarget {
    pub resource: ResourceType,
    pub effect: Effect,
}

impl MutationTarget {
    pub const fn write(resource: ResourceType) -> Self {
        Self {
            resource,
            effect: Effect::Write,
        }
    }

    pub const fn ingest(resource: ResourceType) -> Self {
        Self {
            resource,
            effect: Effect::Ingest,
        }
    }

    pub const fn annotate(resource: ResourceType) -> Self {
        Self {
            resource,
            effect: Effect::Annotate,
        }
    }
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.resource, self.effect)
    }
}

/// Target → dependent matchers, with the reverse index by dependent resource.
#[derive(Debug, Default, Clone)]
pub struct InvalidationGraph {
    dependents: HashMap<MutationTarget, Vec<KeyMatcher>>,
    triggers: HashMap<ResourceType, HashSet<MutationTarget>>,
}

impl InvalidationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The console's dependency graph.
    pub fn standard() -> Self {
        use ResourceType as R;

        let dashboard = KeyMatcher::Resource(R::Dashboard);
        let leads_lists = [
            KeyMatcher::View(R::Leads, View::List),
            KeyMatcher::View(R::Leads, View::Infinite),
        ];

        let mut graph = Self::new();
        for resource in [R::Categories, R::Countries, R::Feeds, R::Tags, R::Subreddits] {
            graph.register(
                MutationTarget::write(resource),
                [KeyMatcher::Resource(resource), dashboard.clone()],
            );
        }
        graph.register(
            MutationTarget::ingest(R::Feeds),
            [
                KeyMatcher::Resource(R::Feeds),
                KeyMatcher::Resource(R::FetchLogs),
                leads_lists[0].clone(),
                leads_lists[1].clone(),
                KeyMatcher::Resource(R::Scrapes),
                KeyMatcher::Resource(R::Approval),
                dashboard.clone(),
            ],
        );
        graph.register(
            MutationTarget::write(R::Leads),
            leads_lists.iter().cloned().chain([dashboard.clone()]),
        );
        graph.register(MutationTarget::annotate(R::Leads), leads_lists);
        graph.register(
            MutationTarget::write(R::FetchLogs),
            [KeyMatcher::View(R::FetchLogs, View::List)],
        );
        graph.register(
            MutationTarget::write(R::Approval),
            [
                KeyMatcher::View(R::Approval, View::Pending),
                KeyMatcher::View(R::Approval, View::Stats),
            ],
        );
        graph.register(
            MutationTarget::write(R::BatchFetch),
            [
                KeyMatcher::View(R::BatchFetch, View::Current),
                KeyMatcher::View(R::BatchFetch, View::Jobs),
            ],
        );
        for channel in Channel::ALL {
            graph.register_channel(channel, &dashboard);
        }
        graph
    }

    fn register_channel(&mut self, channel: Channel, dashboard: &KeyMatcher) {
        let feeds = KeyMatcher::Resource(channel.feeds());
        let posts = channel.posts();
        self.register(
            MutationTarget::write(channel.feeds()),
            [feeds.clone(), dashboard.clone()],
        );
        self.register(
            MutationTarget::write(posts),
            [
                KeyMatcher::View(posts, View::List),
                KeyMatcher::View(posts, View::Infinite),
                dashboard.clone(),
            ],
        );
        self.register(
            MutationTarget::ingest(channel.feeds()),
            [
                feeds,
                KeyMatcher::Resource(posts),
                KeyMatcher::Resource(ResourceType::Approval),
                dashboard.clone(),
            ],
        );
        // Diario Correo articles also surface in the unified scrapes feed.
        if channel == Channel::DiarioCorreo {
            self.register(
                MutationTarget::ingest(channel.feeds()),
                [KeyMatcher::Resource(ResourceType::Scrapes)],
            );
        }
    }

    /// Add dependents for a target. Repeated registrations accumulate.
    pub fn register(
        &mut self,
        target: MutationTarget,
        matchers: impl IntoIterator<Item = KeyMatcher>,
    ) {
        let entry = self.dependents.entry(target).or_default();
        for matcher in matchers {
            if entry.contains(&matcher) {
                continue;
            }
            self.triggers
                .entry(matcher_resource(&matcher))
                .or_default()
                .insert(target);
            entry.push(matcher);
        }
    }

    /// Key families to invalidate once a mutation on `target` settles.
    pub fn dependents(&self, target: MutationTarget) -> &[KeyMatcher] {
        self.dependents
            .get(&target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every target whose mutations refresh keys of `resource`.
    pub fn triggers_for(&self, resource: ResourceType) -> HashSet<MutationTarget> {
        self.triggers.get(&resource).cloned().unwrap_or_default()
    }

    pub fn target_count(&self) -> usize {
        self.dependents.len()
    }
}

fn matcher_resource(matcher: &KeyMatcher) -> ResourceType {
    match matcher {
        KeyMatcher::Exact(key) => key.resource(),
        KeyMatcher::Resource(resource) | KeyMatcher::View(resource, _) => *resource,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::query_keys;

    #[test]
    fn feed_writes_refresh_dashboard() {
        let graph = InvalidationGraph::standard();
        let dependents = graph.dependents(MutationTarget::write(ResourceType::Feeds));
        let dashboard = query_keys::dashboard_stats();
        assert!(dependents.iter().any(|m| m.matches(&query_keys::feeds())));
        assert!(dependents.iter().any(|m| m.matches(&dashboard)));
    }

    #[test]
    fn feed_ingest_reaches_approval_and_leads() {
        let graph = InvalidationGraph::standard();
        let dependents = graph.dependents(MutationTarget::ingest(ResourceType::Feeds));
        let pending = query_keys::approval_pending(None);
        let leads = query_keys::leads_list(&Default::default(), Some(30), Some(0));
        assert!(dependents.iter().any(|m| m.matches(&pending)));
        assert!(dependents.iter().any(|m| m.matches(&leads)));
    }

    #[test]
    fn every_aggregate_writer_is_indexed() {
        let graph = InvalidationGraph::standard();
        let triggers = graph.triggers_for(ResourceType::Dashboard);
        for resource in [
            ResourceType::Categories,
            ResourceType::Countries,
            ResourceType::Feeds,
            ResourceType::Tags,
            ResourceType::Leads,
        ] {
            assert!(triggers.contains(&MutationTarget::write(resource)));
        }
        assert!(!triggers.contains(&MutationTarget::annotate(ResourceType::Leads)));
    }

    #[test]
    fn channel_post_deletes_reach_both_list_shapes() {
        let graph = InvalidationGraph::standard();
        for channel in Channel::ALL {
            let dependents = graph.dependents(MutationTarget::write(channel.posts()));
            let filters = query_keys::PostFilters::default();
            let list = query_keys::channel_posts_list(channel, &filters, Some(30), Some(0));
            let infinite = query_keys::channel_posts_infinite(channel, &filters, 30);
            assert!(dependents.iter().any(|m| m.matches(&list)));
            assert!(dependents.iter().any(|m| m.matches(&infinite)));
            assert!(!dependents.iter().any(|m| m.matches(&query_keys::channel_feeds(channel))));
        }
    }

    #[test]
    fn every_resource_type_has_a_writer() {
        let graph = InvalidationGraph::standard();
        let channel_resources = Channel::ALL
            .into_iter()
            .flat_map(|channel| [channel.feeds(), channel.posts()]);
        for resource in channel_resources.chain([ResourceType::Subreddits]) {
            assert!(!graph.triggers_for(resource).is_empty(), "{resource} has no writer");
        }
    }

    #[test]
    fn unknown_target_has_no_dependents() {
        let graph = InvalidationGraph::new();
        assert!(graph.dependents(MutationTarget::write(ResourceType::Tags)).is_empty());
    }

    #[test]
    fn duplicate_registrations_are_ignored() {
        let mut graph = InvalidationGraph::new();
        let target = MutationTarget::write(ResourceType::Tags);
        graph.register(target, [KeyMatcher::Resource(ResourceType::Tags)]);
        graph.register(target, [KeyMatcher::Resource(ResourceType::Tags)]);
        assert_eq!(graph.dependents(target).len(), 1);
        assert_eq!(graph.target_count(), 1);
    }
}
