//! Contract for entities the engine can cache.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A uniquely keyed record with a reduced list projection.
///
/// Values handed out by the store are clones; callers never mutate cached
/// state in place.
pub trait Resource: Clone + PartialEq + Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;
    type Summary: Clone + PartialEq + Debug + Send + Sync + 'static;

    fn key(&self) -> &Self::Key;

    /// Key of the entity a summary was projected from.
    fn summary_key(summary: &Self::Summary) -> &Self::Key;

    /// List projection of this entity.
    fn project_summary(&self) -> Self::Summary;
}
