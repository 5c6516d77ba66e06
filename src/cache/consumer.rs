//! Invalidation consumer.
//!
//! Drains the event queue and marks the planned queries stale through the
//! query coordinator, which refetches the ones still being observed.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::keys::QueryFilter;
use super::planner::InvalidationPlan;
use super::query::QueryCoordinator;
use super::resource::Resource;

const METRIC_CACHE_CONSUME_MS: &str = "caseflow_cache_consume_ms";

pub struct InvalidationConsumer<R: Resource> {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    queries: QueryCoordinator<R>,
}

impl<R: Resource> InvalidationConsumer<R> {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, queries: QueryCoordinator<R>) -> Self {
        Self {
            config,
            queue,
            queries,
        }
    }

    /// Consume pending events and apply the merged plan.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let marked: usize = plan
            .invalidate
            .iter()
            .map(|key| self.queries.invalidate(&QueryFilter::Exact(key.clone())))
            .sum();

        info!(event_count, marked, "Cache consumption complete");

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    /// Consume until the queue is empty. Returns the number of batches.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }
}
