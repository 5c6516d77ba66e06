use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    /// Field name → message; every violated rule is reported.
    #[error("invalid fields: {}", .fields.keys().cloned().collect::<Vec<_>>().join(", "))]
    Fields { fields: BTreeMap<String, String> },
}

impl DomainError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn fields(fields: BTreeMap<String, String>) -> Self {
        Self::Fields { fields }
    }
}
