//! Leads and the unified scrapes feed, as offset pages and infinite lists.

use async_trait::async_trait;
use curator_api_types::Lead;
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::cache::query_keys::{self, LeadFilters, ScrapeFilters};
use crate::cache::{KeyMatcher, MutationTarget, ResourceType, View};
use crate::error::SyncError;
use crate::infinite::{InfiniteList, PageSource, Termination};
use crate::mutation::MutationPlan;
use crate::mutation::transform::remove_by_id;

use super::Console;

pub const LEADS_PAGE_SIZE: u64 = 30;
pub const SCRAPES_PAGE_SIZE: u64 = 30;

/// Leads endpoint bound to one filter set.
pub struct LeadPages {
    api: ApiClient,
    filters: LeadFilters,
}

#[async_trait]
impl PageSource for LeadPages {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError> {
        self.api
            .leads(&self.filters, Some(limit), Some(offset))
            .await
    }
}

/// Scrapes endpoint bound to one filter set.
pub struct ScrapePages {
    api: ApiClient,
    filters: ScrapeFilters,
}

#[async_trait]
impl PageSource for ScrapePages {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Value, SyncError> {
        self.api
            .scrapes(&self.filters, Some(limit), Some(offset))
            .await
    }
}

impl Console {
    /// One offset page of leads.
    pub async fn leads(
        &self,
        filters: &LeadFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        self.query(
            &query_keys::leads_list(filters, limit, offset),
            self.options(),
            || self.api.leads(filters, limit, offset),
        )
        .await
    }

    pub async fn lead(&self, id: i64) -> Result<Lead, SyncError> {
        self.query(&query_keys::lead(id), self.options(), || self.api.lead(id))
            .await
    }

    /// Leads as an endless list; the backend returns bare pages, so a short
    /// page ends it.
    pub fn leads_infinite(&self, filters: LeadFilters) -> InfiniteList<LeadPages> {
        InfiniteList::new(
            self.store.clone(),
            query_keys::leads_infinite(&filters, LEADS_PAGE_SIZE),
            LEADS_PAGE_SIZE,
            Termination::Length,
            LeadPages {
                api: self.api.clone(),
                filters,
            },
        )
    }

    /// Delete a lead from every cached list and infinite page at once.
    pub async fn delete_lead(&self, id: i64) -> Result<(), SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Leads))
            .affecting(KeyMatcher::View(ResourceType::Leads, View::List))
            .affecting(KeyMatcher::View(ResourceType::Leads, View::Infinite))
            .speculate(move |_, value| remove_by_id(value, &json!(id)))
            .invalidating(query_keys::lead(id));
        self.mutations.mutate(plan, self.api.delete_lead(id)).await
    }

    pub async fn translate_leads(
        &self,
        feed_id: Option<i64>,
        limit: Option<u64>,
    ) -> Result<Value, SyncError> {
        let plan = MutationPlan::new(MutationTarget::annotate(ResourceType::Leads))
            .invalidating(query_keys::translation_stats());
        self.mutations
            .mutate(plan, self.api.translate_leads(feed_id, limit))
            .await
    }

    pub async fn translation_stats(&self) -> Result<Value, SyncError> {
        self.query(&query_keys::translation_stats(), self.options(), || {
            self.api.translation_stats()
        })
        .await
    }

    pub async fn scrapes(
        &self,
        filters: &ScrapeFilters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        self.query(
            &query_keys::scrapes_list(filters, limit, offset),
            self.options(),
            || self.api.scrapes(filters, limit, offset),
        )
        .await
    }

    /// Scrapes as an endless list, ended by the server-reported total.
    pub fn scrapes_infinite(&self, filters: ScrapeFilters) -> InfiniteList<ScrapePages> {
        InfiniteList::new(
            self.store.clone(),
            query_keys::scrapes_infinite(&filters, SCRAPES_PAGE_SIZE),
            SCRAPES_PAGE_SIZE,
            Termination::Count,
            ScrapePages {
                api: self.api.clone(),
                filters,
            },
        )
    }
}
