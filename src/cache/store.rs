//! Resource store: the single shared, mutable cache.
//!
//! Holds at most one copy of each entity plus named collections of summaries,
//! both LRU-bounded. Every write happens under one lock acquisition, so readers
//! never observe a partially applied patch. Writes wake the queries reading the
//! touched slots after the lock is released.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::StoreSlot;
use super::lock::{rw_read, rw_write};
use super::notify::ChangeNotifier;
use super::registry::CacheRegistry;
use super::resource::Resource;

const SOURCE: &str = "cache::store";

const METRIC_STORE_HIT: &str = "caseflow_store_hit_total";
const METRIC_STORE_MISS: &str = "caseflow_store_miss_total";
const METRIC_STORE_EVICT: &str = "caseflow_store_evict_total";

/// Pre-write value of one entity and its projections.
///
/// `entity: None` records that no detail entry existed; restoring it removes
/// whatever was written since.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot<R: Resource> {
    pub key: R::Key,
    pub entity: Option<R>,
    /// `(collection, summary)` for every collection that contained the key.
    pub projections: Vec<(String, R::Summary)>,
}

pub struct ResourceStore<R: Resource> {
    entities: RwLock<LruCache<R::Key, R>>,
    collections: RwLock<LruCache<String, Vec<R::Summary>>>,
    registry: Arc<CacheRegistry<R::Key>>,
    notifier: Arc<ChangeNotifier>,
}

impl<R: Resource> ResourceStore<R> {
    pub fn new(
        config: &CacheConfig,
        registry: Arc<CacheRegistry<R::Key>>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            entities: RwLock::new(LruCache::new(config.entity_limit_non_zero())),
            collections: RwLock::new(LruCache::new(config.collection_limit_non_zero())),
            registry,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<CacheRegistry<R::Key>> {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    // ========================================================================
    // Entities
    // ========================================================================

    pub fn get(&self, key: &R::Key) -> Option<R> {
        let found = rw_write(&self.entities, SOURCE, "get").get(key).cloned();
        record_lookup("entity", found.is_some());
        found
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        rw_read(&self.entities, SOURCE, "contains").contains(key)
    }

    /// Overwrite the cached entity under its own key.
    pub fn set(&self, entity: R) {
        let key = entity.key().clone();
        let evicted = rw_write(&self.entities, SOURCE, "set")
            .push(key.clone(), entity)
            .filter(|(evicted_key, _)| *evicted_key != key)
            .map(|(evicted_key, _)| evicted_key);

        let mut touched = vec![StoreSlot::Entity(key)];
        if let Some(evicted_key) = evicted {
            counter!(METRIC_STORE_EVICT, "kind" => "entity").increment(1);
            debug!(entity_key = %evicted_key, "entity evicted");
            touched.push(StoreSlot::Entity(evicted_key));
        }
        self.notify_slots(touched);
    }

    /// Apply a pure transformation to the cached value; no-op when absent.
    ///
    /// Returns true when an entity was updated.
    pub fn update<F>(&self, key: &R::Key, update: F) -> bool
    where
        F: FnOnce(&R) -> R,
    {
        let updated = {
            let mut entities = rw_write(&self.entities, SOURCE, "update");
            match entities.get_mut(key) {
                Some(current) => {
                    *current = update(current);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.notify_slots([StoreSlot::Entity(key.clone())]);
        }
        updated
    }

    pub fn remove(&self, key: &R::Key) -> Option<R> {
        let removed = rw_write(&self.entities, SOURCE, "remove").pop(key);
        if removed.is_some() {
            self.notify_slots([StoreSlot::Entity(key.clone())]);
        }
        removed
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub fn collection(&self, name: &str) -> Option<Vec<R::Summary>> {
        let found = rw_write(&self.collections, SOURCE, "collection")
            .get(name)
            .cloned();
        record_lookup("collection", found.is_some());
        found
    }

    pub fn set_collection(&self, name: impl Into<String>, items: Vec<R::Summary>) {
        let name = name.into();
        let evicted = rw_write(&self.collections, SOURCE, "set_collection")
            .push(name.clone(), items)
            .filter(|(evicted_name, _)| *evicted_name != name)
            .map(|(evicted_name, _)| evicted_name);

        let mut touched = vec![StoreSlot::Collection(name)];
        if let Some(evicted_name) = evicted {
            counter!(METRIC_STORE_EVICT, "kind" => "collection").increment(1);
            debug!(collection = %evicted_name, "collection evicted");
            touched.push(StoreSlot::Collection(evicted_name));
        }
        self.notify_slots(touched);
    }

    pub fn remove_collection(&self, name: &str) -> Option<Vec<R::Summary>> {
        let removed = rw_write(&self.collections, SOURCE, "remove_collection").pop(name);
        if removed.is_some() {
            self.notify_slots([StoreSlot::Collection(name.to_string())]);
        }
        removed
    }

    /// Apply the same patch to the entry for `key` in every collection that
    /// holds one. Returns the number of collections touched.
    pub fn patch_in_collections<F>(&self, key: &R::Key, patch: F) -> usize
    where
        F: Fn(&R::Summary) -> R::Summary,
    {
        let touched: Vec<String> = {
            let mut collections = rw_write(&self.collections, SOURCE, "patch_in_collections");
            let mut touched = Vec::new();
            for (name, items) in collections.iter_mut() {
                let mut hit = false;
                for item in items.iter_mut().filter(|item| R::summary_key(item) == key) {
                    *item = patch(item);
                    hit = true;
                }
                if hit {
                    touched.push(name.clone());
                }
            }
            touched
        };

        let count = touched.len();
        self.notify_slots(touched.into_iter().map(StoreSlot::Collection));
        count
    }

    /// Drop every summary matching `predicate` from every collection.
    /// Returns the number of summaries removed.
    pub fn remove_from_collections<P>(&self, predicate: P) -> usize
    where
        P: Fn(&R::Summary) -> bool,
    {
        let (removed, touched) = {
            let mut collections =
                rw_write(&self.collections, SOURCE, "remove_from_collections");
            let mut removed = 0;
            let mut touched = Vec::new();
            for (name, items) in collections.iter_mut() {
                let before = items.len();
                items.retain(|item| !predicate(item));
                if items.len() != before {
                    removed += before - items.len();
                    touched.push(name.clone());
                }
            }
            (removed, touched)
        };

        self.notify_slots(touched.into_iter().map(StoreSlot::Collection));
        removed
    }

    /// Names of collections holding an entry for `key`.
    pub fn collections_containing(&self, key: &R::Key) -> Vec<String> {
        rw_read(&self.collections, SOURCE, "collections_containing")
            .iter()
            .filter(|(_, items)| items.iter().any(|item| R::summary_key(item) == key))
            .map(|(name, _)| name.clone())
            .collect()
    }

    // ========================================================================
    // Snapshot / restore
    // ========================================================================

    /// Capture the detail entry and every projection of `key`, without
    /// promoting anything in LRU order.
    pub fn snapshot_entry(&self, key: &R::Key) -> EntrySnapshot<R> {
        let entity = rw_read(&self.entities, SOURCE, "snapshot_entry.entities")
            .peek(key)
            .cloned();
        let projections = rw_read(&self.collections, SOURCE, "snapshot_entry.collections")
            .iter()
            .filter_map(|(name, items)| {
                items
                    .iter()
                    .find(|item| R::summary_key(item) == key)
                    .map(|item| (name.clone(), item.clone()))
            })
            .collect();

        EntrySnapshot {
            key: key.clone(),
            entity,
            projections,
        }
    }

    /// Put back exactly what `snapshot` captured for its key. Other keys'
    /// entries are not touched; collections evicted since are skipped.
    pub fn restore(&self, snapshot: &EntrySnapshot<R>) {
        let key = &snapshot.key;
        let mut touched = vec![StoreSlot::Entity(key.clone())];
        {
            let mut entities = rw_write(&self.entities, SOURCE, "restore.entities");
            let mut collections = rw_write(&self.collections, SOURCE, "restore.collections");

            match &snapshot.entity {
                Some(entity) => {
                    entities.put(key.clone(), entity.clone());
                }
                None => {
                    entities.pop(key);
                }
            }

            for (name, summary) in &snapshot.projections {
                if let Some(items) = collections.peek_mut(name) {
                    for item in items.iter_mut().filter(|item| R::summary_key(item) == key) {
                        *item = summary.clone();
                    }
                    touched.push(StoreSlot::Collection(name.clone()));
                }
            }
        }
        self.notify_slots(touched);
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Clear all cached data.
    pub fn clear(&self) {
        let (entities, collections): (Vec<R::Key>, Vec<String>) = {
            let mut entities = rw_write(&self.entities, SOURCE, "clear.entities");
            let mut collections = rw_write(&self.collections, SOURCE, "clear.collections");
            let keys = entities.iter().map(|(key, _)| key.clone()).collect();
            let names = collections.iter().map(|(name, _)| name.clone()).collect();
            entities.clear();
            collections.clear();
            (keys, names)
        };

        self.notify_slots(
            entities
                .into_iter()
                .map(StoreSlot::Entity)
                .chain(collections.into_iter().map(StoreSlot::Collection)),
        );
    }

    pub fn entity_count(&self) -> usize {
        rw_read(&self.entities, SOURCE, "entity_count").len()
    }

    pub fn collection_count(&self) -> usize {
        rw_read(&self.collections, SOURCE, "collection_count").len()
    }

    fn notify_slots<I>(&self, slots: I)
    where
        I: IntoIterator<Item = StoreSlot<R::Key>>,
    {
        let mut queries = HashSet::new();
        for slot in slots {
            queries.extend(self.registry.queries_for_slot(&slot));
        }
        for query in &queries {
            self.notifier.notify(query);
        }
    }
}

fn record_lookup(kind: &'static str, hit: bool) {
    if hit {
        counter!(METRIC_STORE_HIT, "kind" => kind).increment(1);
    } else {
        counter!(METRIC_STORE_MISS, "kind" => kind).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::QueryKey;
    use crate::cache::testing::{Ticket, summaries, ticket};

    fn store_with(config: &CacheConfig) -> ResourceStore<Ticket> {
        ResourceStore::new(
            config,
            Arc::new(CacheRegistry::new()),
            Arc::new(ChangeNotifier::new()),
        )
    }

    fn store() -> ResourceStore<Ticket> {
        store_with(&CacheConfig::default())
    }

    #[test]
    fn entity_roundtrip() {
        let store = store();
        assert!(store.get(&"t-1".to_string()).is_none());

        store.set(ticket("t-1", "open"));

        let cached = store.get(&"t-1".to_string()).expect("cached ticket");
        assert_eq!(cached.state, "open");

        assert!(store.remove(&"t-1".to_string()).is_some());
        assert!(store.get(&"t-1".to_string()).is_none());
    }

    #[test]
    fn update_is_no_op_when_absent() {
        let store = store();
        let updated = store.update(&"t-1".to_string(), |t| Ticket {
            state: "closed".to_string(),
            ..t.clone()
        });
        assert!(!updated);
        assert!(!store.contains(&"t-1".to_string()));
    }

    #[test]
    fn update_transforms_cached_value() {
        let store = store();
        store.set(ticket("t-1", "open"));

        assert!(store.update(&"t-1".to_string(), |t| Ticket {
            state: "closed".to_string(),
            ..t.clone()
        }));

        let cached = store.get(&"t-1".to_string()).expect("cached ticket");
        assert_eq!(cached.state, "closed");
        assert_eq!(cached.body, "body of t-1");
    }

    #[test]
    fn patch_applies_to_every_collection_containing_key() {
        let store = store();
        store.set_collection("all", summaries(&[("t-1", "open"), ("t-2", "open")]));
        store.set_collection("mine", summaries(&[("t-1", "open")]));
        store.set_collection("other", summaries(&[("t-3", "open")]));

        let touched = store.patch_in_collections(&"t-1".to_string(), |s| {
            let mut next = s.clone();
            next.state = "closed".to_string();
            next
        });

        assert_eq!(touched, 2);
        let all = store.collection("all").expect("all cached");
        assert_eq!(all[0].state, "closed");
        assert_eq!(all[1].state, "open");
        assert_eq!(store.collection("mine").expect("mine cached")[0].state, "closed");
        assert_eq!(store.collection("other").expect("other cached")[0].state, "open");

        let mut containing = store.collections_containing(&"t-1".to_string());
        containing.sort();
        assert_eq!(containing, vec!["all".to_string(), "mine".to_string()]);
    }

    #[test]
    fn remove_from_collections_counts_removed_summaries() {
        let store = store();
        store.set_collection("all", summaries(&[("t-1", "open"), ("t-2", "closed")]));
        store.set_collection("closed", summaries(&[("t-2", "closed")]));

        let removed = store.remove_from_collections(|s| s.state == "closed");

        assert_eq!(removed, 2);
        assert_eq!(store.collection("all").expect("all cached").len(), 1);
        assert!(store.collection("closed").expect("closed cached").is_empty());
    }

    #[test]
    fn restore_puts_back_exact_snapshot_for_key_only() {
        let store = store();
        store.set(ticket("t-1", "open"));
        store.set_collection("all", summaries(&[("t-1", "open"), ("t-2", "open")]));

        let snapshot = store.snapshot_entry(&"t-1".to_string());
        assert_eq!(snapshot.projections.len(), 1);

        // speculative write to t-1, unrelated write to t-2
        store.update(&"t-1".to_string(), |t| Ticket {
            state: "closed".to_string(),
            ..t.clone()
        });
        store.patch_in_collections(&"t-1".to_string(), |s| {
            let mut next = s.clone();
            next.state = "closed".to_string();
            next
        });
        store.patch_in_collections(&"t-2".to_string(), |s| {
            let mut next = s.clone();
            next.state = "blocked".to_string();
            next
        });

        store.restore(&snapshot);

        assert_eq!(store.get(&"t-1".to_string()), Some(ticket("t-1", "open")));
        let all = store.collection("all").expect("all cached");
        assert_eq!(all[0].state, "open");
        assert_eq!(all[1].state, "blocked");
    }

    #[test]
    fn restore_of_absent_entry_removes_it() {
        let store = store();
        let snapshot = store.snapshot_entry(&"t-1".to_string());
        assert!(snapshot.entity.is_none());

        store.set(ticket("t-1", "closed"));
        store.restore(&snapshot);

        assert!(!store.contains(&"t-1".to_string()));
    }

    #[test]
    fn lru_eviction() {
        let config = CacheConfig {
            entity_limit: 2,
            ..Default::default()
        };
        let store = store_with(&config);

        store.set(ticket("t-1", "open"));
        store.set(ticket("t-2", "open"));
        assert!(store.get(&"t-1".to_string()).is_some());

        // t-2 is now least recently used
        store.set(ticket("t-3", "open"));

        assert!(store.get(&"t-2".to_string()).is_none());
        assert!(store.get(&"t-1".to_string()).is_some());
        assert!(store.get(&"t-3".to_string()).is_some());
        assert_eq!(store.entity_count(), 2);
    }

    #[test]
    fn writes_notify_only_dependent_queries() {
        let registry = Arc::new(CacheRegistry::new());
        let notifier = Arc::new(ChangeNotifier::new());
        let store: ResourceStore<Ticket> =
            ResourceStore::new(&CacheConfig::default(), registry.clone(), notifier.clone());

        let detail = QueryKey::new(["ticket", "t-1"]);
        let list = QueryKey::new(["tickets"]);
        registry.register(detail.clone(), StoreSlot::Entity("t-1".to_string()));
        registry.register(list.clone(), StoreSlot::Collection("all".to_string()));
        let mut detail_rx = notifier.subscribe(&detail);
        let mut list_rx = notifier.subscribe(&list);

        store.set(ticket("t-1", "open"));
        assert!(detail_rx.has_changed().expect("sender alive"));
        assert!(!list_rx.has_changed().expect("sender alive"));
        detail_rx.borrow_and_update();

        store.set_collection("all", summaries(&[("t-1", "open")]));
        assert!(list_rx.has_changed().expect("sender alive"));
        assert!(!detail_rx.has_changed().expect("sender alive"));
    }

    #[test]
    fn clear_drops_everything() {
        let store = store();
        store.set(ticket("t-1", "open"));
        store.set_collection("all", summaries(&[("t-1", "open")]));

        store.clear();

        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.collection_count(), 0);
    }
}
