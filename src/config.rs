//! Store configuration
//!
//! Deserializable so callers can embed it in their own config files:
//!
//! ```
//! use palimpsest::{StoreConfig, StoreLocation};
//!
//! let config: StoreConfig =
//!     serde_json::from_str(r#"{ "location": { "file": "/tmp/p.db" }, "query": { "max_rows": 50 } }"#)
//!         .unwrap();
//! assert_eq!(config.query.max_rows, 50);
//! assert!(matches!(config.location, StoreLocation::File(_)));
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the store keeps its records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLocation {
    /// A private SQLite database that disappears with the process
    #[default]
    InMemory,
    /// A SQLite database file, created if missing
    File(PathBuf),
}

/// Limits applied by the read-only query surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows returned by one list request
    pub max_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_rows: 500 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    pub query: QueryConfig,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.query.max_rows = max_rows;
        self
    }
}

/// Get the default database path (`<data_dir>/palimpsest/palimpsest.db`)
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("palimpsest").join("palimpsest.db")
}
