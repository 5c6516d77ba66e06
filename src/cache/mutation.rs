//! Optimistic mutation engine.
//!
//! A mutation runs in seven steps: cancel affected reads, snapshot, patch the
//! store speculatively, call the remote service, then commit the server value
//! or restore the snapshot, and finally mark affected queries stale. The first
//! three run inside [`MutationEngine::mutate`] without suspending, so the patch is
//! visible to the caller as soon as `mutate` returns.
//!
//! At most one mutation per key is in progress. Later mutations for the same
//! key wait in a FIFO queue and start only after the previous one settled.
//! While a mutation is in progress its patch is registered with the
//! coordinator, so reads that land in the meantime keep the speculative value.
//! A remote call that panics is rolled back like any other failure.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, instrument, warn};

use super::error::ServiceError;
use super::events::SettleOutcome;
use super::lock::mutex_lock;
use super::policy::ReconciliationPolicy;
use super::query::{FetchFuture, QueryCoordinator};
use super::resource::Resource;
use super::store::{EntrySnapshot, ResourceStore};
use super::trigger::CacheTrigger;

const SOURCE: &str = "cache::mutation";

const METRIC_MUTATION_COMMITTED: &str = "caseflow_mutation_committed_total";
const METRIC_MUTATION_ROLLED_BACK: &str = "caseflow_mutation_rolled_back_total";
const METRIC_MUTATION_QUEUED: &str = "caseflow_mutation_queued_total";
const METRIC_MUTATION_LATENCY_MS: &str = "caseflow_mutation_latency_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

impl From<SettleOutcome> for MutationStatus {
    fn from(outcome: SettleOutcome) -> Self {
        match outcome {
            SettleOutcome::Committed => Self::Committed,
            SettleOutcome::RolledBack => Self::RolledBack,
        }
    }
}

type RemoteCall<R, Payload> =
    Box<dyn FnOnce(<R as Resource>::Key, Payload) -> FetchFuture<R> + Send>;

struct MutationJob<R: Resource, Payload> {
    payload: Payload,
    call: RemoteCall<R, Payload>,
    status: watch::Sender<MutationStatus>,
    outcome: oneshot::Sender<Result<R, ServiceError>>,
    submitted_at: Instant,
}

/// Caller's view of one submitted mutation.
///
/// Exactly one of the success or error paths is observed, and only after the
/// store has been committed or restored and affected queries marked stale.
pub struct MutationHandle<R: Resource> {
    status: watch::Receiver<MutationStatus>,
    outcome: oneshot::Receiver<Result<R, ServiceError>>,
}

impl<R: Resource> MutationHandle<R> {
    pub fn is_pending(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    pub fn status(&self) -> MutationStatus {
        *self.status.borrow()
    }

    /// Wait until the mutation settles without consuming its outcome.
    pub async fn settled(&mut self) -> MutationStatus {
        let settled = self
            .status
            .wait_for(|status| *status != MutationStatus::Pending)
            .await
            .map(|status| *status);
        settled.unwrap_or_else(|_| *self.status.borrow())
    }

    /// Server entity on commit, or the remote error after rollback.
    pub async fn outcome(self) -> Result<R, ServiceError> {
        self.outcome.await.unwrap_or_else(|_| {
            Err(ServiceError::server(
                503,
                "mutation task dropped before settling",
            ))
        })
    }

    /// Completion hooks; exactly one of them runs.
    pub async fn on_settled<S, E>(self, on_success: S, on_error: E)
    where
        S: FnOnce(R),
        E: FnOnce(ServiceError),
    {
        match self.outcome().await {
            Ok(entity) => on_success(entity),
            Err(error) => on_error(error),
        }
    }
}

struct EngineInner<R: Resource, P: ReconciliationPolicy<R>> {
    policy: Arc<P>,
    store: Arc<ResourceStore<R>>,
    queries: QueryCoordinator<R>,
    trigger: Arc<CacheTrigger<R>>,
    /// Keys with a running driver, mapped to the mutations waiting behind it.
    queues: Mutex<HashMap<R::Key, VecDeque<MutationJob<R, P::Payload>>>>,
}

pub struct MutationEngine<R: Resource, P: ReconciliationPolicy<R>> {
    inner: Arc<EngineInner<R, P>>,
}

impl<R: Resource, P: ReconciliationPolicy<R>> Clone for MutationEngine<R, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource, P: ReconciliationPolicy<R>> MutationEngine<R, P> {
    pub fn new(policy: P, queries: QueryCoordinator<R>, trigger: Arc<CacheTrigger<R>>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                policy: Arc::new(policy),
                store: Arc::clone(queries.store()),
                queries,
                trigger,
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    /// Submit an optimistic mutation of `key`.
    ///
    /// When nothing is pending for `key` the speculative patch is applied
    /// before this returns; otherwise the mutation is queued behind the
    /// pending ones and patched when it reaches the head. Requires a running
    /// tokio runtime.
    pub fn mutate<F, Fut>(&self, key: R::Key, payload: P::Payload, remote: F) -> MutationHandle<R>
    where
        F: FnOnce(R::Key, P::Payload) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, ServiceError>> + Send + 'static,
    {
        let (status_tx, status_rx) = watch::channel(MutationStatus::Pending);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let job = MutationJob {
            payload,
            call: Box::new(move |key, payload| remote(key, payload).boxed()),
            status: status_tx,
            outcome: outcome_tx,
            submitted_at: Instant::now(),
        };

        let first = {
            let mut queues = mutex_lock(&self.inner.queues, SOURCE, "mutate");
            match queues.get_mut(&key) {
                Some(waiting) => {
                    waiting.push_back(job);
                    counter!(METRIC_MUTATION_QUEUED).increment(1);
                    debug!(entity_key = %key, position = waiting.len(), "mutation queued");
                    None
                }
                None => {
                    queues.insert(key.clone(), VecDeque::new());
                    Some(job)
                }
            }
        };

        if let Some(job) = first {
            let snapshot = self.inner.begin(&key, &job.payload);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drive(key, job, snapshot));
        }

        MutationHandle {
            status: status_rx,
            outcome: outcome_rx,
        }
    }

    /// `Some(Pending)` while a mutation of `key` is in progress or queued.
    pub fn pending(&self, key: &R::Key) -> Option<MutationStatus> {
        mutex_lock(&self.inner.queues, SOURCE, "pending")
            .contains_key(key)
            .then_some(MutationStatus::Pending)
    }

    /// In-progress plus queued mutations of `key`.
    pub fn queued(&self, key: &R::Key) -> usize {
        mutex_lock(&self.inner.queues, SOURCE, "queued")
            .get(key)
            .map_or(0, |waiting| waiting.len() + 1)
    }

    pub fn pending_count(&self) -> usize {
        mutex_lock(&self.inner.queues, SOURCE, "pending_count")
            .values()
            .map(|waiting| waiting.len() + 1)
            .sum()
    }
}

impl<R: Resource, P: ReconciliationPolicy<R>> EngineInner<R, P> {
    /// Cancel affected reads, snapshot, then patch. Must not suspend.
    fn begin(&self, key: &R::Key, payload: &P::Payload) -> EntrySnapshot<R> {
        for query in self.policy.affected_queries(key) {
            self.queries.cancel(&query);
        }

        let snapshot = self.store.snapshot_entry(key);
        let (entity_policy, summary_policy) = (Arc::clone(&self.policy), Arc::clone(&self.policy));
        let (entity_payload, summary_payload) = (payload.clone(), payload.clone());
        self.queries.pending_patches().insert(
            key.clone(),
            move |entity| entity_policy.apply_patch(entity, &entity_payload),
            move |summary| summary_policy.apply_patch_to_summary(summary, &summary_payload),
        );

        let patched_detail = self
            .store
            .update(key, |entity| self.policy.apply_patch(entity, payload));
        let patched_lists = self.store.patch_in_collections(key, |summary| {
            self.policy.apply_patch_to_summary(summary, payload)
        });

        debug!(
            entity_key = %key,
            patched_detail,
            patched_lists,
            "optimistic patch applied"
        );
        snapshot
    }

    async fn drive(
        self: Arc<Self>,
        key: R::Key,
        mut job: MutationJob<R, P::Payload>,
        mut snapshot: EntrySnapshot<R>,
    ) {
        let mut guard = DriverGuard {
            inner: &self,
            key: &key,
            snapshot: None,
            finished: false,
        };
        loop {
            guard.snapshot = Some(snapshot.clone());
            self.execute(&key, job, snapshot).await;

            let next = {
                let mut queues = mutex_lock(&self.queues, SOURCE, "drive");
                match queues.get_mut(&key).and_then(VecDeque::pop_front) {
                    Some(next) => Some(next),
                    None => {
                        queues.remove(&key);
                        None
                    }
                }
            };

            match next {
                Some(next) => {
                    snapshot = self.begin(&key, &next.payload);
                    job = next;
                }
                None => break,
            }
        }
        guard.finished = true;
    }

    /// Remote call, commit or rollback and settle invalidation, then delivery
    /// of the outcome.
    #[instrument(skip(self, key, job, snapshot), fields(entity_key = %key))]
    async fn execute(
        &self,
        key: &R::Key,
        job: MutationJob<R, P::Payload>,
        snapshot: EntrySnapshot<R>,
    ) {
        let MutationJob {
            payload,
            call,
            status,
            outcome,
            submitted_at,
        } = job;

        let remote_key = key.clone();
        let result = AssertUnwindSafe(async move { call(remote_key, payload).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("remote mutation call panicked");
                Err(ServiceError::server(500, "remote call panicked"))
            });

        let settled = match &result {
            Ok(entity) => {
                self.commit(entity);
                counter!(METRIC_MUTATION_COMMITTED).increment(1);
                info!(outcome = "committed", "mutation committed");
                SettleOutcome::Committed
            }
            Err(error) => {
                self.store.restore(&snapshot);
                counter!(METRIC_MUTATION_ROLLED_BACK, "kind" => error.kind().as_str())
                    .increment(1);
                warn!(outcome = "rolled_back", error = %error, "mutation rolled back");
                SettleOutcome::RolledBack
            }
        };
        self.queries.pending_patches().remove(key);

        self.trigger
            .mutation_settled(key, settled, self.policy.affected_queries(key));

        histogram!(METRIC_MUTATION_LATENCY_MS, "outcome" => settled.as_str())
            .record(submitted_at.elapsed().as_secs_f64() * 1000.0);

        status.send_replace(settled.into());
        if outcome.send(result).is_err() {
            debug!("mutation handle dropped before settle");
        }
    }

    fn commit(&self, entity: &R) {
        let summary = self.policy.project_summary(entity);
        self.store.set(entity.clone());
        self.store
            .patch_in_collections(entity.key(), |_| summary.clone());
    }
}

/// Cleans up after a driver task that stops without finishing, e.g. when the
/// runtime shuts down mid-call: the in-progress patch is restored, and the key
/// is released. Queued jobs are dropped, so their handles report the error.
struct DriverGuard<'a, R: Resource, P: ReconciliationPolicy<R>> {
    inner: &'a EngineInner<R, P>,
    key: &'a R::Key,
    snapshot: Option<EntrySnapshot<R>>,
    finished: bool,
}

impl<R: Resource, P: ReconciliationPolicy<R>> Drop for DriverGuard<'_, R, P> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(snapshot) = &self.snapshot {
            self.inner.store.restore(snapshot);
        }
        self.inner.queries.pending_patches().remove(self.key);
        let dropped = mutex_lock(&self.inner.queues, SOURCE, "driver_guard")
            .remove(self.key)
            .map_or(0, |waiting| waiting.len());
        warn!(entity_key = %self.key, dropped, "mutation driver stopped before settling");
    }
}
