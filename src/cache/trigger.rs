//! Cache trigger service.
//!
//! Publishes cache events and optionally consumes them immediately.

use std::sync::Arc;

use super::consumer::InvalidationConsumer;
use super::events::{EventKind, EventQueue, SettleOutcome};
use super::keys::QueryKey;
use super::resource::Resource;

/// Entry point for write paths that need queries revalidated.
///
/// ```ignore
/// // after a mutation settles:
/// trigger.mutation_settled(&key, SettleOutcome::Committed, affected);
/// ```
pub struct CacheTrigger<R: Resource> {
    queue: Arc<EventQueue>,
    consumer: Arc<InvalidationConsumer<R>>,
}

impl<R: Resource> CacheTrigger<R> {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<InvalidationConsumer<R>>) -> Self {
        Self { queue, consumer }
    }

    /// Publish an event; with `consume_now` the queue is drained before
    /// returning, otherwise events wait for the next consumption.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) {
        self.queue.publish(kind);
        if consume_now {
            self.consumer.consume_all();
        }
    }

    pub fn mutation_settled(
        &self,
        entity: &R::Key,
        outcome: SettleOutcome,
        queries: Vec<QueryKey>,
    ) {
        self.trigger(
            EventKind::MutationSettled {
                entity: entity.to_string(),
                outcome,
                queries,
            },
            true,
        );
    }

    pub fn queries_invalidated(&self, queries: Vec<QueryKey>) {
        self.trigger(EventKind::QueriesInvalidated { queries }, true);
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<InvalidationConsumer<R>> {
        &self.consumer
    }
}
