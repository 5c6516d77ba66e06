//! Status-change requests and the rules they must satisfy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;
use crate::domain::types::CaseStatus;

pub const MIN_REJECTION_REASON_CHARS: usize = 10;

pub const STATUS_MUST_CHANGE: &str = "Status must change";
pub const REASON_TOO_SHORT: &str = "Reason is required and must be at least 10 characters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatusPayload {
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UpdateStatusPayload {
    pub fn new(status: CaseStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Only a no-op transition is invalid.
pub fn is_status_transition_valid(current: CaseStatus, next: CaseStatus) -> bool {
    current != next
}

fn reason_is_sufficient(reason: Option<&str>) -> bool {
    reason.is_some_and(|reason| reason.trim().chars().count() >= MIN_REJECTION_REASON_CHARS)
}

/// Check a status change against the current status. Every violated rule is
/// reported, keyed by the payload field it concerns.
pub fn validate_status_change(
    current: CaseStatus,
    payload: &UpdateStatusPayload,
) -> Result<(), DomainError> {
    let mut fields = BTreeMap::new();

    if !is_status_transition_valid(current, payload.status) {
        fields.insert("status".to_string(), STATUS_MUST_CHANGE.to_string());
    }
    if payload.status == CaseStatus::Rejected && !reason_is_sufficient(payload.reason.as_deref()) {
        fields.insert("reason".to_string(), REASON_TOO_SHORT.to_string());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(DomainError::fields(fields))
    }
}
