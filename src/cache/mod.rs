//! Optimistic mutation and read-cache reconciliation engine.
//!
//! Generic over any [`Resource`]:
//!
//! - **Resource store**: LRU-bounded entities and named summary collections
//! - **Query coordinator**: de-duplicated, cancellable, retried reads with
//!   derived staleness and reactive subscriptions
//! - **Mutation engine**: speculative patch, commit or exact rollback, and
//!   settle invalidation, serialised per key
//! - **Pending patches**: the in-progress patch of each key, reapplied to
//!   reads that land before the mutation settles
//! - **Reconciliation policy**: the resource-specific patch and projection
//!   rules the engine applies
//!
//! ## Configuration
//!
//! Controlled via the `[cache]` section of `caseflow.toml`:
//!
//! ```toml
//! [cache]
//! entity_limit = 500
//! query_limit = 256
//! list_stale_time_ms = 60000
//! list_retry_attempts = 3
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod engine;
mod error;
mod events;
mod keys;
pub(crate) mod lock;
mod mutation;
mod notify;
mod pending;
mod planner;
mod policy;
mod query;
mod registry;
mod resource;
mod store;
mod trigger;

#[cfg(test)]
mod testing;

pub use config::CacheConfig;
pub use consumer::InvalidationConsumer;
pub use engine::CacheEngine;
pub use error::{ErrorKind, FieldErrors, ServiceError};
pub use events::{CacheEvent, Epoch, EventKind, EventQueue, SettleOutcome};
pub use keys::{QueryFilter, QueryKey, StoreSlot};
pub use mutation::{MutationEngine, MutationHandle, MutationStatus};
pub use notify::ChangeNotifier;
pub use pending::PendingPatches;
pub use planner::InvalidationPlan;
pub use policy::ReconciliationPolicy;
pub use query::{
    FetchFuture, QueryCoordinator, QueryData, QueryDescriptor, QueryOptions, QueryState,
    QueryStatus, QuerySubscription, RetryPolicy,
};
pub use registry::CacheRegistry;
pub use resource::Resource;
pub use store::{EntrySnapshot, ResourceStore};
pub use trigger::CacheTrigger;
