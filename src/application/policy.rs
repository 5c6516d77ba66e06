//! Reconciliation rules for cases.

use crate::cache::{QueryKey, ReconciliationPolicy, Resource};
use crate::domain::cases::UpdateStatusPayload;
use crate::domain::entities::{CaseRecord, CaseSummary};

/// Store collection holding the case list.
pub const CASES_COLLECTION: &str = "cases";

pub fn cases_key() -> QueryKey {
    QueryKey::new(["cases"])
}

pub fn case_key(id: &str) -> QueryKey {
    QueryKey::new(["case", id])
}

impl Resource for CaseRecord {
    type Key = String;
    type Summary = CaseSummary;

    fn key(&self) -> &String {
        &self.id
    }

    fn summary_key(summary: &CaseSummary) -> &String {
        &summary.id
    }

    fn project_summary(&self) -> CaseSummary {
        self.summary()
    }
}

/// A status change patches only `status`; the reason is not cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct CasePolicy;

impl ReconciliationPolicy<CaseRecord> for CasePolicy {
    type Payload = UpdateStatusPayload;

    fn apply_patch(&self, entity: &CaseRecord, payload: &UpdateStatusPayload) -> CaseRecord {
        CaseRecord {
            status: payload.status,
            ..entity.clone()
        }
    }

    fn apply_patch_to_summary(
        &self,
        summary: &CaseSummary,
        payload: &UpdateStatusPayload,
    ) -> CaseSummary {
        CaseSummary {
            status: payload.status,
            ..summary.clone()
        }
    }

    fn affected_queries(&self, id: &String) -> Vec<QueryKey> {
        vec![cases_key(), case_key(id)]
    }
}
