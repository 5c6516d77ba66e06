//! Failure taxonomy shared by the read and write paths.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Field name → message, as reported by the remote service.
pub type FieldErrors = BTreeMap<String, String>;

/// Closed set of failures a data-service call can settle with.
///
/// The engine dispatches rollback and retry on the variant alone; it never
/// inspects messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("`{key}` not found")]
    NotFound { key: String },
    #[error("validation failed: {}", format_field_errors(.field_errors))]
    Validation { field_errors: FieldErrors },
    #[error("service error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
}

/// Fieldless discriminant used by presentation code to pick a message style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Server,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Timeout => "timeout",
        }
    }
}

impl ServiceError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn validation(field_errors: FieldErrors) -> Self {
        Self::Validation { field_errors }
    }

    /// Single-field validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut field_errors = FieldErrors::new();
        field_errors.insert(field.into(), message.into());
        Self::Validation { field_errors }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// HTTP-equivalent status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::Server { status, .. } => *status,
            Self::Timeout { .. } => 504,
        }
    }

    /// Transient faults only. A missing record or a rejected payload will not
    /// change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Timeout { .. })
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { field_errors } => Some(field_errors),
            _ => None,
        }
    }
}

fn format_field_errors(field_errors: &FieldErrors) -> String {
    field_errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
