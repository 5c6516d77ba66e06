//! Query coordinator.
//!
//! Owns the lifecycle of reads against the resource store: population,
//! freshness, in-flight de-duplication, cancellation, retry and subscriber
//! notification.
//!
//! Per query: `Idle → Fetching → {Success | Error}`; a later fetch re-enters
//! `Fetching`. Staleness is derived from the freshness timestamp and an
//! explicit invalidation flag, never stored as a state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use lru::LruCache;
use metrics::counter;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::config::CacheConfig;
use super::error::ServiceError;
use super::keys::{QueryFilter, QueryKey, StoreSlot};
use super::lock::mutex_lock;
use super::notify::ChangeNotifier;
use super::pending::PendingPatches;
use super::registry::CacheRegistry;
use super::resource::Resource;
use super::store::ResourceStore;

const SOURCE: &str = "cache::query";

const METRIC_FETCH_STARTED: &str = "caseflow_query_fetch_started_total";
const METRIC_FETCH_DEDUPED: &str = "caseflow_query_fetch_deduped_total";
const METRIC_FETCH_CANCELLED: &str = "caseflow_query_fetch_cancelled_total";
const METRIC_FETCH_FAILED: &str = "caseflow_query_fetch_failed_total";
const METRIC_FETCH_RETRY: &str = "caseflow_query_fetch_retry_total";
const METRIC_QUERY_EVICT: &str = "caseflow_query_evict_total";

pub type FetchFuture<T> = BoxFuture<'static, Result<T, ServiceError>>;

type FetchResult<R> = Result<QueryData<R>, ServiceError>;
type SharedFetch<R> = Shared<BoxFuture<'static, FetchOutcome<R>>>;

/// What a shared fetch resolves to. `applied` is false when the fetch was
/// cancelled or superseded, in which case `result` must not be handed out.
#[derive(Clone)]
struct FetchOutcome<R: Resource> {
    result: FetchResult<R>,
    applied: bool,
}

/// Result of a query: one entity or one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData<R: Resource> {
    Entity(R),
    Collection(Vec<R::Summary>),
}

impl<R: Resource> QueryData<R> {
    pub fn entity(&self) -> Option<&R> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Collection(_) => None,
        }
    }

    pub fn collection(&self) -> Option<&[R::Summary]> {
        match self {
            Self::Entity(_) => None,
            Self::Collection(items) => Some(items),
        }
    }

    pub fn into_entity(self) -> Option<R> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Collection(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<Vec<R::Summary>> {
        match self {
            Self::Entity(_) => None,
            Self::Collection(items) => Some(items),
        }
    }
}

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retry.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        attempts: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl QueryOptions {
    pub fn new(stale_time: Duration, retry: RetryPolicy) -> Self {
        Self { stale_time, retry }
    }
}

#[derive(Clone)]
enum Fetcher<R: Resource> {
    Entity(Arc<dyn Fn() -> FetchFuture<R> + Send + Sync>),
    Collection(Arc<dyn Fn() -> FetchFuture<Vec<R::Summary>> + Send + Sync>),
}

impl<R: Resource> Fetcher<R> {
    fn fetch(&self) -> BoxFuture<'static, FetchResult<R>> {
        match self {
            Self::Entity(fetch) => fetch().map_ok(QueryData::Entity).boxed(),
            Self::Collection(fetch) => fetch().map_ok(QueryData::Collection).boxed(),
        }
    }
}

/// A named read: cache key, the store slot its result lives in, how to fetch
/// it, and its freshness/retry options.
#[derive(Clone)]
pub struct QueryDescriptor<R: Resource> {
    key: QueryKey,
    slot: StoreSlot<R::Key>,
    fetcher: Fetcher<R>,
    options: QueryOptions,
}

impl<R: Resource> QueryDescriptor<R> {
    /// Read of one entity, stored under `entity_key`.
    pub fn entity<F, Fut>(
        key: QueryKey,
        entity_key: R::Key,
        fetch: F,
        options: QueryOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ServiceError>> + Send + 'static,
    {
        Self {
            key,
            slot: StoreSlot::Entity(entity_key),
            fetcher: Fetcher::Entity(Arc::new(move || fetch().boxed())),
            options,
        }
    }

    /// Read of a collection of summaries, stored under `name`.
    pub fn collection<F, Fut>(
        key: QueryKey,
        name: impl Into<String>,
        fetch: F,
        options: QueryOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R::Summary>, ServiceError>> + Send + 'static,
    {
        Self {
            key,
            slot: StoreSlot::Collection(name.into()),
            fetcher: Fetcher::Collection(Arc::new(move || fetch().boxed())),
            options,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn slot(&self) -> &StoreSlot<R::Key> {
        &self.slot
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Fetching,
    Success,
    Error,
}

/// Point-in-time view of a query, as handed to presentation code.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<R: Resource> {
    pub key: QueryKey,
    pub data: Option<QueryData<R>>,
    pub status: QueryStatus,
    pub error: Option<ServiceError>,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl<R: Resource> QueryState<R> {
    /// First load: fetching with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Fetching && self.data.is_none()
    }

    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Fetching
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

struct QueryEntry<R: Resource> {
    descriptor: QueryDescriptor<R>,
    status: QueryStatus,
    /// Status to fall back to when an in-flight fetch is cancelled.
    settled: QueryStatus,
    error: Option<ServiceError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    in_flight: Option<SharedFetch<R>>,
    subscribers: usize,
}

impl<R: Resource> QueryEntry<R> {
    fn new(descriptor: QueryDescriptor<R>) -> Self {
        Self {
            descriptor,
            status: QueryStatus::Idle,
            settled: QueryStatus::Idle,
            error: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            in_flight: None,
            subscribers: 0,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.updated_at {
            Some(updated_at) => now.duration_since(updated_at) > self.descriptor.options.stale_time,
            None => true,
        }
    }

    fn is_evictable(&self) -> bool {
        self.subscribers == 0 && self.in_flight.is_none()
    }

    fn state(&self, data: Option<QueryData<R>>, now: Instant) -> QueryState<R> {
        QueryState {
            key: self.descriptor.key.clone(),
            data,
            status: self.status,
            error: self.error.clone(),
            is_stale: self.is_stale(now),
            updated_at: self.updated_at,
        }
    }
}

struct CoordinatorInner<R: Resource> {
    config: CacheConfig,
    store: Arc<ResourceStore<R>>,
    registry: Arc<CacheRegistry<R::Key>>,
    notifier: Arc<ChangeNotifier>,
    pending: Arc<PendingPatches<R>>,
    entries: Mutex<LruCache<QueryKey, QueryEntry<R>>>,
    next_generation: AtomicU64,
}

/// Cheap-to-clone handle; all clones share one set of query entries.
pub struct QueryCoordinator<R: Resource> {
    inner: Arc<CoordinatorInner<R>>,
}

impl<R: Resource> Clone for QueryCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> QueryCoordinator<R> {
    pub fn new(config: CacheConfig, store: Arc<ResourceStore<R>>) -> Self {
        let registry = Arc::clone(store.registry());
        let notifier = Arc::clone(store.notifier());
        let entries = Mutex::new(LruCache::new(config.query_limit_non_zero()));
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                store,
                registry,
                notifier,
                pending: Arc::new(PendingPatches::new()),
                entries,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ResourceStore<R>> {
        &self.inner.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Patches of in-progress mutations, reapplied to every fetched result.
    pub fn pending_patches(&self) -> &Arc<PendingPatches<R>> {
        &self.inner.pending
    }

    /// Current state, starting a background fetch when the result is absent
    /// or stale and none is in flight. Never waits on the network.
    ///
    /// Requires a running tokio runtime.
    pub fn query(&self, descriptor: &QueryDescriptor<R>) -> QueryState<R> {
        let now = Instant::now();
        let data = self.inner.read_slot(&descriptor.slot);
        let (state, started) = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "query");
            let entry = self.inner.entry_mut(&mut entries, descriptor);
            let started = entry.in_flight.is_none() && (data.is_none() || entry.is_stale(now));
            if started {
                self.inner.start_fetch(entry);
            }
            (entry.state(data, now), started)
        };
        if started {
            self.inner.notifier.notify(&descriptor.key);
        }
        state
    }

    /// Cached data when present and fresh; otherwise waits for a fetch,
    /// joining the in-flight one if any.
    pub async fn fetch(
        &self,
        descriptor: &QueryDescriptor<R>,
    ) -> Result<QueryData<R>, ServiceError> {
        self.fetch_inner(descriptor, false).await
    }

    /// Waits for a fetch regardless of freshness, joining the in-flight one
    /// if any.
    pub async fn refetch(
        &self,
        descriptor: &QueryDescriptor<R>,
    ) -> Result<QueryData<R>, ServiceError> {
        self.fetch_inner(descriptor, true).await
    }

    /// A joined fetch that gets cancelled or superseded hands back nothing;
    /// the caller starts over and sees the current store or a newer fetch.
    async fn fetch_inner(
        &self,
        descriptor: &QueryDescriptor<R>,
        force: bool,
    ) -> Result<QueryData<R>, ServiceError> {
        loop {
            match self.fetch_once(descriptor, force).await {
                Ok(outcome) if !outcome.applied => {
                    debug!(
                        query_key = %descriptor.key,
                        "joined fetch was superseded; retrying read"
                    );
                }
                Ok(outcome) => return outcome.result,
                Err(cached) => return Ok(cached),
            }
        }
    }

    /// `Err` carries fresh cached data; `Ok` the outcome of a shared fetch.
    async fn fetch_once(
        &self,
        descriptor: &QueryDescriptor<R>,
        force: bool,
    ) -> Result<FetchOutcome<R>, QueryData<R>> {
        let now = Instant::now();
        let data = self.inner.read_slot(&descriptor.slot);
        let (pending, started) = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "fetch");
            let entry = self.inner.entry_mut(&mut entries, descriptor);
            match (&entry.in_flight, &data) {
                (Some(in_flight), _) => {
                    counter!(METRIC_FETCH_DEDUPED).increment(1);
                    debug!(query_key = %descriptor.key, "joined in-flight fetch");
                    (Ok(in_flight.clone()), false)
                }
                (None, Some(data)) if !force && !entry.is_stale(now) => (Err(data.clone()), false),
                (None, _) => (Ok(self.inner.start_fetch(entry)), true),
            }
        };
        if started {
            self.inner.notifier.notify(&descriptor.key);
        }

        match pending {
            Ok(shared) => Ok(shared.await),
            Err(cached) => Err(cached),
        }
    }

    /// Subscribe to a query. The returned handle observes every change to the
    /// query's status or to the store slot it reads; an initial fetch is
    /// started when needed.
    pub fn subscribe(&self, descriptor: QueryDescriptor<R>) -> QuerySubscription<R> {
        let changes = self.inner.notifier.subscribe(&descriptor.key);
        {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "subscribe");
            let entry = self.inner.entry_mut(&mut entries, &descriptor);
            entry.subscribers += 1;
        }
        self.query(&descriptor);
        QuerySubscription {
            coordinator: self.clone(),
            descriptor,
            changes,
        }
    }

    /// Mark matching queries stale. Matching queries with subscribers are
    /// refetched in the background when configured to; an in-flight fetch of
    /// a matching query is superseded since it may predate the change.
    ///
    /// Returns the number of queries marked.
    pub fn invalidate(&self, filter: &QueryFilter) -> usize {
        let refetch_active = self.inner.config.refetch_active_on_invalidate;
        let marked: Vec<QueryKey> = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "invalidate");
            let mut marked = Vec::new();
            for (key, entry) in entries.iter_mut() {
                if !filter.matches(key) {
                    continue;
                }
                entry.invalidated = true;
                let superseded = entry.in_flight.take().is_some();
                if superseded {
                    entry.status = entry.settled;
                }
                if refetch_active && entry.subscribers > 0 {
                    self.inner.start_fetch(entry);
                }
                marked.push(key.clone());
            }
            marked
        };

        for key in &marked {
            debug!(query_key = %key, "query invalidated");
            self.inner.notifier.notify(key);
        }
        marked.len()
    }

    /// Suppress the result of the in-flight fetch for `key`. The request may
    /// still complete, but its result is never written to the store.
    ///
    /// Returns true when a fetch was cancelled.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        let cancelled = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "cancel");
            match entries.peek_mut(key) {
                Some(entry) if entry.in_flight.is_some() => {
                    entry.in_flight = None;
                    entry.status = entry.settled;
                    true
                }
                _ => false,
            }
        };
        if cancelled {
            counter!(METRIC_FETCH_CANCELLED).increment(1);
            debug!(query_key = %key, "in-flight fetch cancelled");
            self.inner.notifier.notify(key);
        }
        cancelled
    }

    /// State of `descriptor`, registering it if unknown, without starting a
    /// fetch.
    pub fn current(&self, descriptor: &QueryDescriptor<R>) -> QueryState<R> {
        let now = Instant::now();
        let data = self.inner.read_slot(&descriptor.slot);
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "current");
        self.inner.entry_mut(&mut entries, descriptor).state(data, now)
    }

    /// State of a known query without starting a fetch.
    pub fn state(&self, key: &QueryKey) -> Option<QueryState<R>> {
        let now = Instant::now();
        let (slot, mut state) = {
            let entries = mutex_lock(&self.inner.entries, SOURCE, "state");
            let entry = entries.peek(key)?;
            (entry.descriptor.slot.clone(), entry.state(None, now))
        };
        state.data = self.inner.read_slot(&slot);
        Some(state)
    }

    /// Unknown queries count as stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let now = Instant::now();
        mutex_lock(&self.inner.entries, SOURCE, "is_stale")
            .peek(key)
            .is_none_or(|entry| entry.is_stale(now))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.inner.entries, SOURCE, "is_fetching")
            .peek(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn query_count(&self) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "query_count").len()
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "subscriber_count")
            .peek(key)
            .map_or(0, |entry| entry.subscribers)
    }

    fn release(&self, key: &QueryKey) {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "release");
        if let Some(entry) = entries.peek_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
    }
}

impl<R: Resource> CoordinatorInner<R> {
    fn read_slot(&self, slot: &StoreSlot<R::Key>) -> Option<QueryData<R>> {
        match slot {
            StoreSlot::Entity(key) => self.store.get(key).map(QueryData::Entity),
            StoreSlot::Collection(name) => {
                self.store.collection(name).map(QueryData::Collection)
            }
        }
    }

    fn entry_mut<'a>(
        &self,
        entries: &'a mut LruCache<QueryKey, QueryEntry<R>>,
        descriptor: &QueryDescriptor<R>,
    ) -> &'a mut QueryEntry<R> {
        if !entries.contains(&descriptor.key) {
            self.make_room(entries);
        }
        self.registry
            .register(descriptor.key.clone(), descriptor.slot.clone());
        let entry = entries.get_or_insert_mut(descriptor.key.clone(), || {
            QueryEntry::new(descriptor.clone())
        });
        entry.descriptor = descriptor.clone();
        entry
    }

    /// Evict the least recently used query without subscribers or an
    /// in-flight fetch. When every entry is pinned the bound grows by one.
    fn make_room(&self, entries: &mut LruCache<QueryKey, QueryEntry<R>>) {
        if entries.len() < entries.cap().get() {
            return;
        }
        let victim = entries
            .iter()
            .rev()
            .find(|(_, entry)| entry.is_evictable())
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                entries.pop(&key);
                self.registry.unregister(&key);
                self.notifier.remove(&key);
                counter!(METRIC_QUERY_EVICT).increment(1);
                debug!(query_key = %key, "query entry evicted");
            }
            None => {
                let cap = entries.cap().saturating_add(1);
                warn!(
                    query_limit = self.config.query_limit,
                    pinned = entries.len(),
                    "every query entry is pinned; growing query cache"
                );
                entries.resize(cap);
            }
        }
    }

    fn start_fetch(self: &Arc<Self>, entry: &mut QueryEntry<R>) -> SharedFetch<R> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if entry.status != QueryStatus::Fetching {
            entry.settled = entry.status;
        }
        entry.status = QueryStatus::Fetching;
        entry.generation = generation;

        let inner = Arc::clone(self);
        let descriptor = entry.descriptor.clone();
        let shared = async move { inner.run_fetch(descriptor, generation).await }
            .boxed()
            .shared();
        entry.in_flight = Some(shared.clone());
        tokio::spawn(shared.clone());

        counter!(METRIC_FETCH_STARTED).increment(1);
        debug!(query_key = %entry.descriptor.key, generation, "fetch started");
        shared
    }

    fn is_current(&self, key: &QueryKey, generation: u64) -> bool {
        mutex_lock(&self.entries, SOURCE, "is_current")
            .peek(key)
            .is_some_and(|entry| entry.generation == generation && entry.in_flight.is_some())
    }

    #[instrument(skip(self, descriptor), fields(query_key = %descriptor.key))]
    async fn run_fetch(&self, descriptor: QueryDescriptor<R>, generation: u64) -> FetchOutcome<R> {
        let retry = descriptor.options.retry;
        let mut attempt = 0;
        let result = loop {
            match descriptor.fetcher.fetch().await {
                Ok(data) => break Ok(data),
                Err(error)
                    if error.is_retryable()
                        && attempt < retry.attempts
                        && self.is_current(&descriptor.key, generation) =>
                {
                    let delay = retry.delay_for(attempt);
                    attempt += 1;
                    counter!(METRIC_FETCH_RETRY).increment(1);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => break Err(error),
            }
        };

        self.settle_fetch(&descriptor, generation, result)
    }

    /// Pending mutation patches are applied to fetched data before it is
    /// written, so the stored value and the returned one both stay
    /// speculative until those mutations settle.
    fn settle_fetch(
        &self,
        descriptor: &QueryDescriptor<R>,
        generation: u64,
        result: FetchResult<R>,
    ) -> FetchOutcome<R> {
        let key = &descriptor.key;
        let (result, applied) = {
            let mut entries = mutex_lock(&self.entries, SOURCE, "settle_fetch");
            match entries.peek_mut(key) {
                Some(entry) if entry.generation == generation && entry.in_flight.is_some() => {
                    entry.in_flight = None;
                    let result = result.map(|data| self.pending.apply(data));
                    match &result {
                        Ok(data) => {
                            self.write_slot(&descriptor.slot, data);
                            entry.status = QueryStatus::Success;
                            entry.error = None;
                            entry.updated_at = Some(Instant::now());
                            entry.invalidated = false;
                        }
                        Err(error) => {
                            counter!(METRIC_FETCH_FAILED, "kind" => error.kind().as_str())
                                .increment(1);
                            warn!(query_key = %key, error = %error, "fetch failed");
                            entry.status = QueryStatus::Error;
                            entry.error = Some(error.clone());
                        }
                    }
                    entry.settled = entry.status;
                    (result, true)
                }
                _ => (result, false),
            }
        };

        if applied {
            debug!(query_key = %key, generation, ok = result.is_ok(), "fetch settled");
            self.notifier.notify(key);
        } else {
            debug!(query_key = %key, generation, "discarded superseded fetch result");
        }
        FetchOutcome { result, applied }
    }

    fn write_slot(&self, slot: &StoreSlot<R::Key>, data: &QueryData<R>) {
        match (slot, data) {
            (StoreSlot::Entity(expected), QueryData::Entity(entity)) => {
                if entity.key() != expected {
                    warn!(
                        expected = %expected,
                        actual = %entity.key(),
                        "fetched entity key differs from query slot"
                    );
                }
                self.store.set(entity.clone());
            }
            (StoreSlot::Collection(name), QueryData::Collection(items)) => {
                self.store.set_collection(name.clone(), items.clone());
            }
            (slot, _) => {
                warn!(slot = %slot, "fetched data does not match query slot; not cached");
            }
        }
    }
}

/// Live view of one query. Dropping it releases the subscription.
pub struct QuerySubscription<R: Resource> {
    coordinator: QueryCoordinator<R>,
    descriptor: QueryDescriptor<R>,
    changes: watch::Receiver<u64>,
}

impl<R: Resource> QuerySubscription<R> {
    pub fn key(&self) -> &QueryKey {
        &self.descriptor.key
    }

    /// Current state. Never starts a fetch: subscribing, [`Self::refetch`]
    /// and invalidation do, so a render loop over `changed` and `state`
    /// costs no requests.
    pub fn state(&self) -> QueryState<R> {
        self.coordinator.current(&self.descriptor)
    }

    /// Current state without triggering a fetch.
    pub fn peek(&self) -> Option<QueryState<R>> {
        self.coordinator.state(&self.descriptor.key)
    }

    /// Wait for the next change. Returns false once the query was evicted.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }

    pub async fn refetch(&self) -> Result<QueryData<R>, ServiceError> {
        self.coordinator.refetch(&self.descriptor).await
    }
}

impl<R: Resource> Drop for QuerySubscription<R> {
    fn drop(&mut self) {
        self.coordinator.release(&self.descriptor.key);
    }
}
