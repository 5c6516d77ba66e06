use std::collections::BTreeMap;

use thiserror::Error;

use crate::cache::{ErrorKind, ServiceError};
use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Field-level messages to attach to form inputs, from either the local
    /// guard or the remote service.
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            AppError::Domain(DomainError::Fields { fields }) => Some(fields),
            AppError::Service(error) => error.field_errors(),
            _ => None,
        }
    }

    /// True when the failure belongs next to form fields rather than in a
    /// banner.
    pub fn is_inline(&self) -> bool {
        self.field_errors().is_some()
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) => "Case not found",
            AppError::Domain(DomainError::Validation { .. } | DomainError::Fields { .. }) => {
                "Request could not be processed"
            }
            AppError::Service(error) => match error.kind() {
                ErrorKind::NotFound => "Case not found",
                ErrorKind::Validation => "Request could not be processed",
                ErrorKind::Server => "Server error",
                ErrorKind::Timeout => "The service did not respond in time",
            },
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Output(_) | InfraError::Timestamp(_)) => {
                "Output could not be rendered"
            }
            AppError::Config(_) => "Service misconfigured",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}
