use curator_api_types::DashboardStats;
use serde_json::Value;

use crate::cache::query_keys::{self, LeadFilters};
use crate::error::SyncError;

use super::Console;

impl Console {
    /// Summary counts, derived from the cached collections where present.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, SyncError> {
        self.query(&query_keys::dashboard_stats(), self.options(), || {
            self.compute_dashboard_stats()
        })
        .await
    }

    async fn compute_dashboard_stats(&self) -> Result<Value, SyncError> {
        let lead_filters = LeadFilters::default();
        let (categories, feeds, tags, leads) = futures::try_join!(
            self.categories(),
            self.feeds(),
            self.tags(),
            self.api.leads(&lead_filters, Some(1), None),
        )?;

        let stats = DashboardStats {
            categories: categories.len() as u64,
            feeds: feeds.len() as u64,
            active_feeds: feeds.iter().filter(|feed| feed.active()).count() as u64,
            tags: tags.len() as u64,
            leads: lead_count(&leads),
        };
        serde_json::to_value(stats).map_err(SyncError::from)
    }
}

/// Leads reported by a `limit=1` count request: the envelope total when present,
/// else the length of the returned page.
fn lead_count(page: &Value) -> u64 {
    page.get("total_count")
        .and_then(Value::as_u64)
        .or_else(|| page.as_array().map(|items| items.len() as u64))
        .unwrap_or(0)
}
