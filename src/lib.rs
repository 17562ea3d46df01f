//! Client-side state synchronization for the curation admin console.
//!
//! A keyed query cache with request deduplication and invalidation, optimistic
//! mutations with rollback, offset-paged infinite lists, adaptive job polling,
//! a self-expiring login session and a serialized dialog queue. [`Console`]
//! bundles them into one context object.

pub mod api;
pub mod cache;
pub mod config;
pub mod console;
pub mod dialog;
pub mod error;
pub mod infinite;
pub mod mutation;
pub mod polling;
pub mod session;
pub mod telemetry;

pub use console::Console;
pub use error::{ErrorKind, SyncError};
