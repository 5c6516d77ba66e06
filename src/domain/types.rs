//! Shared domain enumerations.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Lifecycle of a case. Any transition between two different statuses is
/// permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    New,
    InReview,
    Approved,
    Rejected,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 4] = [
        Self::New,
        Self::InReview,
        Self::Approved,
        Self::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InReview => "in review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl Display for CaseStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "in_review" => Ok(Self::InReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown case status `{other}`"
            ))),
        }
    }
}
