//! Storage trait definitions

use crate::store::ChangeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    /// Stored rows that break an invariant the engine relies on
    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable backend for a text store
///
/// Implementations must be thread-safe (Send + Sync). The engine calls
/// `commit` while holding its writer lock, so calls never overlap.
pub trait RecordStore: Send + Sync {
    /// Apply every op of a change set, all or nothing
    fn commit(&self, changes: &ChangeSet) -> StorageResult<()>;

    /// Read the whole store back as puts, parents before children, followed
    /// by `AdvanceSequence` ops so keys freed by deletes stay retired
    fn load(&self) -> StorageResult<ChangeSet>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: RecordStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
