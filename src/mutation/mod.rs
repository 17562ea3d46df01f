//! Optimistic mutations against the query cache.
//!
//! A mutation runs as one task:
//! 1. Cancel in-flight fetches of the affected keys
//! 2. Snapshot the affected entries
//! 3. Apply the speculative transform (tagged with the mutation id)
//! 4. Await the backend request
//! 5. On success, merge the server response
//! 6. On failure, roll the snapshot back before returning the error
//! 7. Invalidate the dependents of the mutation target
//!
//! Dropping the mutation future before the request settles runs steps 6 and
//! 7 as if the request had been cancelled.

pub mod transform;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheKey, CacheStore, InvalidationGraph, KeyMatcher, MutationId, MutationTarget,
};
use crate::error::SyncError;

const METRIC_ROLLBACK: &str = "curator_mutation_rollback_total";
const METRIC_MUTATION_MS: &str = "curator_mutation_ms";

type Speculative = Box<dyn Fn(&CacheKey, &Value) -> Option<Value> + Send + Sync>;
type Merge<T> = Box<dyn Fn(&CacheKey, &Value, &T) -> Option<Value> + Send + Sync>;

/// How a failed mutation treats entries another write touched in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Restore a key only while it still carries this mutation's speculative
    /// write.
    #[default]
    TagGuarded,
    /// Restore every snapshotted key regardless of later writes.
    Unconditional,
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TagGuarded => "tag_guarded",
            Self::Unconditional => "unconditional",
        })
    }
}

/// Values of the affected keys captured before any speculative write.
#[derive(Debug, Clone)]
pub struct MutationSnapshot {
    id: MutationId,
    prior: Vec<CacheEntry>,
}

impl MutationSnapshot {
    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn affected_keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.prior.iter().map(|entry| &entry.key)
    }

    pub fn prior_value(&self, key: &CacheKey) -> Option<&Value> {
        self.prior
            .iter()
            .find(|entry| &entry.key == key)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.prior.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
    }
}

/// What one mutation touches and how.
pub struct MutationPlan<T> {
    target: MutationTarget,
    affected: Vec<KeyMatcher>,
    speculative: Option<Speculative>,
    merge: Option<Merge<T>>,
    extra_invalidations: Vec<KeyMatcher>,
}

impl<T> MutationPlan<T> {
    pub fn new(target: MutationTarget) -> Self {
        Self {
            target,
            affected: Vec::new(),
            speculative: None,
            merge: None,
            extra_invalidations: Vec::new(),
        }
    }

    /// Keys to cancel, snapshot and transform.
    pub fn affecting(mut self, matcher: impl Into<KeyMatcher>) -> Self {
        self.affected.push(matcher.into());
        self
    }

    pub fn speculate<F>(mut self, transform: F) -> Self
    where
        F: Fn(&CacheKey, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.speculative = Some(Box::new(transform));
        self
    }

    /// Write the server response into each affected key that has a value.
    pub fn merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(&CacheKey, &Value, &T) -> Option<Value> + Send + Sync + 'static,
    {
        self.merge = Some(Box::new(merge));
        self
    }

    /// Invalidate `matcher` on settle in addition to the graph's dependents.
    pub fn invalidating(mut self, matcher: impl Into<KeyMatcher>) -> Self {
        self.extra_invalidations.push(matcher.into());
        self
    }

    pub fn target(&self) -> MutationTarget {
        self.target
    }
}

/// Executes mutations against a shared [`CacheStore`].
#[derive(Clone)]
pub struct MutationCoordinator {
    store: Arc<CacheStore>,
    graph: Arc<InvalidationGraph>,
    policy: RollbackPolicy,
}

impl MutationCoordinator {
    pub fn new(store: Arc<CacheStore>, graph: Arc<InvalidationGraph>) -> Self {
        Self {
            store,
            graph,
            policy: RollbackPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Run `request` under `plan`. Never retried.
    ///
    /// The returned error is only observed after the cache has been restored.
    pub async fn mutate<T, Fut>(&self, plan: MutationPlan<T>, request: Fut) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let started = Instant::now();
        let snapshot = self.begin(&plan);
        let written = self.apply_speculative(&plan, &snapshot);

        let unsettled = Unsettled {
            coordinator: self,
            plan: &plan,
            snapshot: &snapshot,
            written: &written,
            armed: true,
        };
        let outcome = request.await;
        unsettled.disarm();

        match &outcome {
            Ok(response) => self.confirm(&plan, &snapshot, &written, response),
            Err(error) => self.rollback(&snapshot, &written, error),
        }
        self.invalidate_dependents(&plan);

        histogram!(METRIC_MUTATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target_resource = %plan.target,
            mutation_id = %snapshot.id,
            result = if outcome.is_ok() { "committed" } else { "rolled_back" },
            "Mutation settled"
        );
        outcome
    }

    /// Steps 1 and 2: cancel, then snapshot. Runs without suspending.
    fn begin<T>(&self, plan: &MutationPlan<T>) -> MutationSnapshot {
        let id = MutationId::new();
        let cancelled: usize = plan
            .affected
            .iter()
            .map(|matcher| self.store.cancel_in_flight(matcher))
            .sum();

        let mut prior: Vec<CacheEntry> = Vec::new();
        for matcher in &plan.affected {
            for entry in self.store.entries_matching(matcher) {
                if !prior.iter().any(|seen| seen.key == entry.key) {
                    prior.push(entry);
                }
            }
        }

        debug!(
            target_resource = %plan.target,
            mutation_id = %id,
            cancelled,
            snapshotted = prior.len(),
            "Mutation started"
        );
        MutationSnapshot { id, prior }
    }

    /// Step 3. Returns the keys that received a speculative write.
    fn apply_speculative<T>(&self, plan: &MutationPlan<T>, snapshot: &MutationSnapshot) -> Vec<CacheKey> {
        let Some(transform) = &plan.speculative else {
            return Vec::new();
        };
        let mut written = Vec::new();
        for entry in &snapshot.prior {
            let Some(value) = &entry.value else {
                continue;
            };
            if let Some(next) = transform(&entry.key, value) {
                self.store.write_tagged(&entry.key, next, snapshot.id);
                written.push(entry.key.clone());
            }
        }
        written
    }

    /// Step 5.
    fn confirm<T>(
        &self,
        plan: &MutationPlan<T>,
        snapshot: &MutationSnapshot,
        written: &[CacheKey],
        response: &T,
    ) {
        if let Some(merge) = &plan.merge {
            for key in snapshot.affected_keys() {
                let Some(current) = self.store.value(key) else {
                    continue;
                };
                if let Some(next) = merge(key, &current, response) {
                    self.store.set(key, next);
                }
            }
        }
        for key in written {
            self.store.clear_tag(key, snapshot.id);
        }
    }

    /// Step 6.
    fn rollback(&self, snapshot: &MutationSnapshot, written: &[CacheKey], error: &SyncError) {
        let mut restored = 0usize;
        let mut skipped = 0usize;
        for entry in snapshot.prior.iter().filter(|entry| written.contains(&entry.key)) {
            let owned = self.store.tag_of(&entry.key) == Some(snapshot.id);
            if self.policy == RollbackPolicy::TagGuarded && !owned {
                skipped += 1;
                warn!(
                    key = %entry.key,
                    mutation_id = %snapshot.id,
                    "Rollback skipped; entry was overwritten after the speculative write"
                );
                continue;
            }
            self.store.restore(entry.clone());
            restored += 1;
        }

        counter!(METRIC_ROLLBACK).increment(1);
        warn!(
            mutation_id = %snapshot.id,
            policy = %self.policy,
            restored,
            skipped,
            error = %error,
            "Mutation failed; cache rolled back"
        );
    }

    /// Step 7.
    fn invalidate_dependents<T>(&self, plan: &MutationPlan<T>) {
        let dependents = self.graph.dependents(plan.target);
        for matcher in dependents.iter().chain(&plan.extra_invalidations) {
            self.store.invalidate(matcher);
        }
    }
}

/// Rolls a mutation back when its future is dropped mid-request.
struct Unsettled<'a, T> {
    coordinator: &'a MutationCoordinator,
    plan: &'a MutationPlan<T>,
    snapshot: &'a MutationSnapshot,
    written: &'a [CacheKey],
    armed: bool,
}

impl<T> Unsettled<'_, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for Unsettled<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.coordinator
            .rollback(self.snapshot, self.written, &SyncError::Cancelled);
        self.coordinator.invalidate_dependents(self.plan);
        info!(
            target_resource = %self.plan.target,
            mutation_id = %self.snapshot.id,
            "Mutation dropped before settling"
        );
    }
}
