//! Speculative patches of in-progress mutations.
//!
//! A read that lands while a mutation of one of its keys is in progress
//! would otherwise replace the optimistic value with the server's old one.
//! The coordinator passes every fetched result through [`PendingPatches`]
//! before writing it, so detail entries and list projections keep showing
//! the speculative value until the mutation settles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::lock::mutex_lock;
use super::query::QueryData;
use super::resource::Resource;

const SOURCE: &str = "cache::pending";

type EntityPatch<R> = Arc<dyn Fn(&R) -> R + Send + Sync>;
type SummaryPatch<R> =
    Arc<dyn Fn(&<R as Resource>::Summary) -> <R as Resource>::Summary + Send + Sync>;

struct PendingPatch<R: Resource> {
    entity: EntityPatch<R>,
    summary: SummaryPatch<R>,
}

impl<R: Resource> Clone for PendingPatch<R> {
    fn clone(&self) -> Self {
        Self {
            entity: Arc::clone(&self.entity),
            summary: Arc::clone(&self.summary),
        }
    }
}

/// At most one patch per key: the mutation currently in progress.
pub struct PendingPatches<R: Resource> {
    patches: Mutex<HashMap<R::Key, PendingPatch<R>>>,
}

impl<R: Resource> PendingPatches<R> {
    pub fn new() -> Self {
        Self {
            patches: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert<E, S>(&self, key: R::Key, entity: E, summary: S)
    where
        E: Fn(&R) -> R + Send + Sync + 'static,
        S: Fn(&R::Summary) -> R::Summary + Send + Sync + 'static,
    {
        let patch = PendingPatch {
            entity: Arc::new(entity),
            summary: Arc::new(summary),
        };
        mutex_lock(&self.patches, SOURCE, "insert").insert(key, patch);
    }

    pub fn remove(&self, key: &R::Key) -> bool {
        mutex_lock(&self.patches, SOURCE, "remove")
            .remove(key)
            .is_some()
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        mutex_lock(&self.patches, SOURCE, "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.patches, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetched data with every pending patch applied to the entries it
    /// names. Entries without a pending mutation pass through unchanged.
    pub fn apply(&self, data: QueryData<R>) -> QueryData<R> {
        let patches = mutex_lock(&self.patches, SOURCE, "apply").clone();
        if patches.is_empty() {
            return data;
        }

        match data {
            QueryData::Entity(entity) => match patches.get(entity.key()) {
                Some(patch) => {
                    debug!(entity_key = %entity.key(), "pending patch reapplied to fetched entity");
                    QueryData::Entity((patch.entity)(&entity))
                }
                None => QueryData::Entity(entity),
            },
            QueryData::Collection(items) => QueryData::Collection(
                items
                    .into_iter()
                    .map(|item| match patches.get(R::summary_key(&item)) {
                        Some(patch) => (patch.summary)(&item),
                        None => item,
                    })
                    .collect(),
            ),
        }
    }
}

impl<R: Resource> Default for PendingPatches<R> {
    fn default() -> Self {
        Self::new()
    }
}
