//! Invalidation plan generation.
//!
//! Merges a batch of cache events into the set of queries to mark stale.
//! Events are applied in epoch order, whatever order they were drained in.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::{CacheEvent, Epoch, EventKind, SettleOutcome};
use super::keys::QueryKey;

#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Queries to mark stale, ordered for deterministic logs.
    pub invalidate: BTreeSet<QueryKey>,
    /// Settled entities in epoch order.
    pub settled: Vec<(String, SettleOutcome)>,
    pub committed: usize,
    pub rolled_back: usize,
    /// Highest epoch merged into this plan.
    pub last_epoch: Option<Epoch>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ invalidate: {}, committed: {}, rolled_back: {}, epoch: {:?} }}",
            self.invalidate.len(),
            self.committed,
            self.rolled_back,
            self.last_epoch,
        )
    }
}

impl InvalidationPlan {
    /// Merge events into one plan. Duplicate event ids are applied once and
    /// each query appears once no matter how many events name it.
    pub fn from_events(mut events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        events.sort_by_key(|event| event.epoch);

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            plan.last_epoch = Some(event.epoch);
            match event.kind {
                EventKind::MutationSettled {
                    entity,
                    outcome,
                    queries,
                } => {
                    match outcome {
                        SettleOutcome::Committed => plan.committed += 1,
                        SettleOutcome::RolledBack => plan.rolled_back += 1,
                    }
                    plan.settled.push((entity, outcome));
                    plan.invalidate.extend(queries);
                }
                EventKind::QueriesInvalidated { queries } => {
                    plan.invalidate.extend(queries);
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.invalidate.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(entity: &str, outcome: SettleOutcome, epoch: u64) -> CacheEvent {
        CacheEvent::new(
            EventKind::MutationSettled {
                entity: entity.to_string(),
                outcome,
                queries: vec![QueryKey::new(["cases"]), QueryKey::new(["case", entity])],
            },
            epoch,
        )
    }

    #[test]
    fn merges_queries_across_events() {
        let plan = InvalidationPlan::from_events(vec![
            settled("case-1", SettleOutcome::Committed, 0),
            settled("case-2", SettleOutcome::RolledBack, 1),
        ]);

        // the shared list key appears once
        assert_eq!(plan.invalidate.len(), 3);
        assert!(plan.invalidate.contains(&QueryKey::new(["cases"])));
        assert_eq!(plan.committed, 1);
        assert_eq!(plan.rolled_back, 1);
    }

    #[test]
    fn events_apply_in_epoch_order() {
        let plan = InvalidationPlan::from_events(vec![
            settled("case-3", SettleOutcome::Committed, 7),
            settled("case-1", SettleOutcome::RolledBack, 2),
            settled("case-2", SettleOutcome::Committed, 5),
        ]);

        assert_eq!(
            plan.settled,
            vec![
                ("case-1".to_string(), SettleOutcome::RolledBack),
                ("case-2".to_string(), SettleOutcome::Committed),
                ("case-3".to_string(), SettleOutcome::Committed),
            ]
        );
        assert_eq!(plan.last_epoch, Some(7));
    }

    #[test]
    fn dedupe_by_event_id() {
        let event = settled("case-1", SettleOutcome::Committed, 0);
        let plan = InvalidationPlan::from_events(vec![event.clone(), event]);

        assert_eq!(plan.committed, 1);
        assert_eq!(plan.invalidate.len(), 2);
    }

    #[test]
    fn explicit_invalidation() {
        let plan = InvalidationPlan::from_events(vec![CacheEvent::new(
            EventKind::QueriesInvalidated {
                queries: vec![QueryKey::new(["case", "case-9"])],
            },
            0,
        )]);

        assert!(plan.invalidate.contains(&QueryKey::new(["case", "case-9"])));
        assert_eq!(plan.committed + plan.rolled_back, 0);
    }

    #[test]
    fn display_and_empty() {
        let plan = InvalidationPlan::default();
        assert!(plan.is_empty());
        assert!(plan.to_string().contains("invalidate: 0"));
        assert_eq!(plan.last_epoch, None);
    }
}
