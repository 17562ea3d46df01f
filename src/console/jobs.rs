//! Batch fetch jobs.

use std::time::Duration;

use curator_api_types::JobSnapshot;
use serde_json::Value;

use crate::cache::{MutationTarget, ResourceType, query_keys};
use crate::error::SyncError;
use crate::mutation::MutationPlan;
use crate::polling::PollHandle;

use super::Console;

const CURRENT_JOB_STALE: Duration = Duration::from_secs(2);
const JOB_LIST_STALE: Duration = Duration::from_secs(10);

impl Console {
    /// The latest job, or `None` when no job has ever run.
    pub async fn current_job(&self) -> Result<Option<JobSnapshot>, SyncError> {
        self.query(
            &query_keys::batch_fetch_current(),
            self.options().with_stale_time(CURRENT_JOB_STALE),
            || self.api.batch_fetch_current(),
        )
        .await
    }

    /// Poll the current job: every 5 s while it runs, every 30 s otherwise.
    pub fn watch_current_job(&self) -> PollHandle {
        let api = self.api.clone();
        self.polling.watch(
            query_keys::batch_fetch_current(),
            self.options().with_stale_time(CURRENT_JOB_STALE),
            move || {
                let api = api.clone();
                async move { api.batch_fetch_current().await }
            },
            self.polling_config.job_interval(),
        )
    }

    pub async fn batch_fetch_jobs(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value, SyncError> {
        self.query(
            &query_keys::batch_fetch_jobs(limit, offset),
            self.options().with_stale_time(JOB_LIST_STALE),
            || self.api.batch_fetch_jobs(limit, offset),
        )
        .await
    }

    pub async fn batch_fetch_job(&self, id: i64) -> Result<JobSnapshot, SyncError> {
        self.query(&query_keys::batch_fetch_job(id), self.options(), || {
            self.api.batch_fetch_job(id)
        })
        .await
    }

    pub async fn start_batch_fetch(&self, force: bool) -> Result<JobSnapshot, SyncError> {
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::BatchFetch));
        self.mutations
            .mutate(plan, self.api.start_batch_fetch(force))
            .await
    }
}
