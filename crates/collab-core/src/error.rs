//! Error types and result alias for the collab core.
//!
//! Validation and not-found errors always name the offending field or
//! record so they can be surfaced to the caller unchanged. Name resolution
//! never produces an error value; see [`crate::naming`].

use crate::models::TaskStatus;

/// The result type used throughout the collab core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by core operations and [`Store`](crate::store::Store)
/// implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A creation or edit request violates a field constraint.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A referenced record does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Record type that was looked up.
        resource: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A task status change outside `pending -> running -> {completed, failed}`.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// The instance aggregate could not be written. Nothing was persisted.
    #[error("instance aggregate write failed: {message}")]
    AggregateWrite {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Another writer changed the record between read and write.
    #[error("concurrent update conflict: {message}")]
    Conflict { message: String },

    /// Any other backend failure.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a validation error for `field`.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Creates a not-found error for a record of type `resource`.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error wrapping an underlying cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an aggregate write error wrapping an underlying cause.
    #[must_use]
    pub fn aggregate_write(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::AggregateWrite {
            message: message.into(),
            source,
        }
    }

    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The field named by a validation error, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            Self::InvalidTransition { .. } => Some("status"),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::storage_with_source("payload serialization failed", err)
    }
}
