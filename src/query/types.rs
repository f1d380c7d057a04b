//! Query result structures

use serde::Serialize;
use serde_json::Value;

/// Result of one query request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// The request's `op` name
    pub op: &'static str,
    /// Result rows, at most `max_rows`
    pub rows: Vec<Value>,
    /// Row count before truncation
    pub total: usize,
    pub truncated: bool,
}

impl QueryResponse {
    pub fn single(op: &'static str, row: Value) -> Self {
        Self {
            op,
            rows: vec![row],
            total: 1,
            truncated: false,
        }
    }

    /// Keep the first `max_rows` rows, remembering how many there were
    pub fn limited(op: &'static str, mut rows: Vec<Value>, max_rows: usize) -> Self {
        let total = rows.len();
        rows.truncate(max_rows);
        Self {
            op,
            truncated: rows.len() < total,
            rows,
            total,
        }
    }
}
