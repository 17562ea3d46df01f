//! Curator query cache.
//!
//! Server state is mirrored into a keyed store:
//!
//! - **Keys**: structured `resource / view / filters / cursor` identities built
//!   by [`query_keys`]; families are selected with [`KeyMatcher`].
//! - **Store**: one watch channel per key, deduplicated and abortable fetches,
//!   stale tracking and garbage collection of unread entries.
//! - **Graph**: which key families each mutation makes stale.
//!
//! ## Configuration
//!
//! Timings are controlled via the `[cache]` table of `curator.toml`:
//!
//! ```toml
//! [cache]
//! stale_time_ms = 300000
//! gc_time_ms = 600000
//! query_retry_limit = 3
//! ```

mod config;
mod graph;
mod keys;
mod lock;
pub mod query_keys;
mod store;

pub use config::{CacheConfig, QueryOptions};
pub use graph::{Effect, InvalidationGraph, MutationTarget};
pub use keys::{CacheKey, FilterSignature, KeyMatcher, ResourceType, View};
pub(crate) use lock::LockExt;
pub use store::{CacheEntry, CacheStore, EntryStatus, MutationId, QueryObserver};
