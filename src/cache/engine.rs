//! Wiring of one engine instance: store, coordinator, invalidation pipeline
//! and mutation engine sharing the same registry and notifier.

use std::sync::Arc;

use tracing::info;

use super::config::CacheConfig;
use super::consumer::InvalidationConsumer;
use super::events::EventQueue;
use super::mutation::MutationEngine;
use super::notify::ChangeNotifier;
use super::policy::ReconciliationPolicy;
use super::query::QueryCoordinator;
use super::registry::CacheRegistry;
use super::resource::Resource;
use super::store::ResourceStore;
use super::trigger::CacheTrigger;

/// One cache session. Independent instances share nothing.
pub struct CacheEngine<R: Resource, P: ReconciliationPolicy<R>> {
    config: CacheConfig,
    store: Arc<ResourceStore<R>>,
    queries: QueryCoordinator<R>,
    trigger: Arc<CacheTrigger<R>>,
    mutations: MutationEngine<R, P>,
}

impl<R: Resource, P: ReconciliationPolicy<R>> CacheEngine<R, P> {
    pub fn new(config: CacheConfig, policy: P) -> Self {
        let registry = Arc::new(CacheRegistry::new());
        let notifier = Arc::new(ChangeNotifier::new());
        let store = Arc::new(ResourceStore::new(&config, registry, notifier));
        let queries = QueryCoordinator::new(config.clone(), Arc::clone(&store));

        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(InvalidationConsumer::new(
            config.clone(),
            Arc::clone(&queue),
            queries.clone(),
        ));
        let trigger = Arc::new(CacheTrigger::new(queue, consumer));
        let mutations = MutationEngine::new(policy, queries.clone(), Arc::clone(&trigger));

        info!(
            entity_limit = config.entity_limit,
            collection_limit = config.collection_limit,
            query_limit = config.query_limit,
            "Cache engine initialised"
        );

        Self {
            config,
            store,
            queries,
            trigger,
            mutations,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ResourceStore<R>> {
        &self.store
    }

    pub fn queries(&self) -> &QueryCoordinator<R> {
        &self.queries
    }

    pub fn trigger(&self) -> &Arc<CacheTrigger<R>> {
        &self.trigger
    }

    pub fn mutations(&self) -> &MutationEngine<R, P> {
        &self.mutations
    }
}

impl<R: Resource, P: ReconciliationPolicy<R>> Clone for CacheEngine<R, P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            queries: self.queries.clone(),
            trigger: Arc::clone(&self.trigger),
            mutations: self.mutations.clone(),
        }
    }
}
