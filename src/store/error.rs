//! Error taxonomy for store operations
//!
//! Every error is local to one mutation: when a write returns `Err`, nothing
//! from it was persisted or indexed.

use crate::model::EditionId;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Identity key collision on a non-idempotent create
    #[error("Duplicate {entity}: {key}")]
    Uniqueness { entity: &'static str, key: String },

    /// A record references a parent or leaf that does not exist
    #[error("Dangling reference from {entity}: {key}")]
    ReferentialIntegrity { entity: &'static str, key: String },

    /// A membership's denormalized edition disagrees with its parent's
    #[error("Edition mismatch against {parent}: got edition {got}, expected {expected}")]
    Consistency {
        parent: &'static str,
        got: EditionId,
        expected: EditionId,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A write was routed through the read-only query surface
    #[error("Read-only surface: '{0}' is a write operation")]
    ReadOnly(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::Uniqueness {
            entity,
            key: key.to_string(),
        }
    }

    pub fn dangling(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::ReferentialIntegrity {
            entity,
            key: key.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
