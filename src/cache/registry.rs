//! Bidirectional dependency registry.
//!
//! Tracks which queries read which store slots, so a store write can wake
//! exactly the queries whose result it changed.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::RwLock;

use super::keys::{QueryKey, StoreSlot};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks slot → query keys and query key → slot mappings.
///
/// A query reads exactly one slot; a slot may back many queries.
pub struct CacheRegistry<K> {
    slot_to_queries: RwLock<HashMap<StoreSlot<K>, HashSet<QueryKey>>>,
    query_to_slot: RwLock<HashMap<QueryKey, StoreSlot<K>>>,
}

impl<K> CacheRegistry<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            slot_to_queries: RwLock::new(HashMap::new()),
            query_to_slot: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `query` reads `slot`, replacing any previous slot.
    pub fn register(&self, query: QueryKey, slot: StoreSlot<K>) {
        let mut s2q = rw_write(&self.slot_to_queries, SOURCE, "register.slot_to_queries");
        let mut q2s = rw_write(&self.query_to_slot, SOURCE, "register.query_to_slot");

        if let Some(previous) = q2s.insert(query.clone(), slot.clone()) {
            detach(&mut s2q, &previous, &query);
        }
        s2q.entry(slot).or_default().insert(query);
    }

    /// All queries reading `slot`.
    pub fn queries_for_slot(&self, slot: &StoreSlot<K>) -> HashSet<QueryKey> {
        rw_read(&self.slot_to_queries, SOURCE, "queries_for_slot")
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    pub fn slot_for_query(&self, query: &QueryKey) -> Option<StoreSlot<K>> {
        rw_read(&self.query_to_slot, SOURCE, "slot_for_query")
            .get(query)
            .cloned()
    }

    /// Remove a query and clean up its slot mapping.
    ///
    /// Called when a query entry is evicted.
    pub fn unregister(&self, query: &QueryKey) {
        let mut s2q = rw_write(&self.slot_to_queries, SOURCE, "unregister.slot_to_queries");
        let mut q2s = rw_write(&self.query_to_slot, SOURCE, "unregister.query_to_slot");

        if let Some(slot) = q2s.remove(query) {
            detach(&mut s2q, &slot, query);
        }
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        rw_write(&self.slot_to_queries, SOURCE, "clear.slot_to_queries").clear();
        rw_write(&self.query_to_slot, SOURCE, "clear.query_to_slot").clear();
    }

    /// Number of slots with at least one reader.
    pub fn slot_count(&self) -> usize {
        rw_read(&self.slot_to_queries, SOURCE, "slot_count").len()
    }

    pub fn query_count(&self) -> usize {
        rw_read(&self.query_to_slot, SOURCE, "query_count").len()
    }
}

fn detach<K: Eq + Hash>(
    s2q: &mut HashMap<StoreSlot<K>, HashSet<QueryKey>>,
    slot: &StoreSlot<K>,
    query: &QueryKey,
) {
    if let Some(queries) = s2q.get_mut(slot) {
        queries.remove(query);
        if queries.is_empty() {
            s2q.remove(slot);
        }
    }
}

impl<K> Default for CacheRegistry<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
