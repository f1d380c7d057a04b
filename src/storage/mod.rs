//! Storage backends for the text store
//!
//! The engine keeps everything in memory and writes through a `RecordStore`.
//! The provided implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{OpenStore, RecordStore, StorageError, StorageResult};
