//! Reconciliation rules for optimistic writes.
//!
//! A policy decides what a speculative write looks like in the detail entry
//! and in every list projection, and which queries must be revalidated once
//! the write settles. Implementations are pure: they receive values and
//! return new ones.

use std::fmt::Debug;

use super::keys::QueryKey;
use super::resource::Resource;

pub trait ReconciliationPolicy<R: Resource>: Send + Sync + 'static {
    /// Mutation input, e.g. a status change request.
    type Payload: Clone + Debug + Send + Sync + 'static;

    /// Speculative next value of a cached entity. Must be deterministic and
    /// must not validate; validation happens before the engine is invoked.
    fn apply_patch(&self, entity: &R, payload: &Self::Payload) -> R;

    /// Speculative next value of a list projection of the same entity.
    fn apply_patch_to_summary(&self, summary: &R::Summary, payload: &Self::Payload)
    -> R::Summary;

    /// Projection written into collections when a server value is committed.
    fn project_summary(&self, entity: &R) -> R::Summary {
        entity.project_summary()
    }

    /// Queries to cancel before the patch and to mark stale after settle.
    fn affected_queries(&self, key: &R::Key) -> Vec<QueryKey>;
}
