//! The read-only query surface
//!
//! Agents and other untrusted callers talk to the store only through
//! [`QuerySurface`]. It holds no reference to any write path: requests are a
//! closed set of read operations, and a raw request naming a mutation is
//! refused before its parameters are even looked at.

use super::request::{is_write_op, QueryRequest};
use super::types::QueryResponse;
use crate::config::QueryConfig;
use crate::store::{Palimpsest, Snapshot, StoreError, StoreResult};
use crate::storage::StorageError;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

fn to_row<T: Serialize>(item: T) -> StoreResult<Value> {
    serde_json::to_value(item).map_err(|e| StorageError::from(e).into())
}

fn to_rows<T: Serialize>(items: impl IntoIterator<Item = T>) -> StoreResult<Vec<Value>> {
    items.into_iter().map(to_row).collect()
}

/// Read-only access to a store
#[derive(Debug, Clone)]
pub struct QuerySurface {
    store: Arc<Palimpsest>,
    config: QueryConfig,
}

impl QuerySurface {
    pub fn new(store: Arc<Palimpsest>) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: Arc<Palimpsest>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    /// JSON Schema of every accepted request
    pub fn schema() -> schemars::Schema {
        schemars::schema_for!(QueryRequest)
    }

    /// Parse and validate a raw request without running it.
    ///
    /// Write operations are rejected with [`StoreError::ReadOnly`]; anything
    /// else that is not a well-formed read request is
    /// [`StoreError::InvalidRequest`].
    pub fn check(&self, raw: &str) -> StoreResult<QueryRequest> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| StoreError::InvalidRequest(format!("not valid JSON: {e}")))?;
        let op = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidRequest("request must be a JSON object".into()))?
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::InvalidRequest("missing string field 'op'".into()))?;
        if is_write_op(op) {
            warn!(op, "rejected write operation on read-only surface");
            return Err(StoreError::ReadOnly(op.to_string()));
        }
        serde_json::from_value(value).map_err(|e| StoreError::InvalidRequest(e.to_string()))
    }

    /// Check and run a raw JSON request
    pub fn execute_json(&self, raw: &str) -> StoreResult<QueryResponse> {
        let request = self.check(raw)?;
        self.execute(&request)
    }

    /// Run a request against one consistent snapshot
    pub fn execute(&self, request: &QueryRequest) -> StoreResult<QueryResponse> {
        let snap = self.store.snapshot();
        let response = self.run(&snap, request)?;
        debug!(
            op = response.op,
            total = response.total,
            truncated = response.truncated,
            "query served"
        );
        Ok(response)
    }

    fn run(&self, snap: &Snapshot, request: &QueryRequest) -> StoreResult<QueryResponse> {
        let op = request.op();
        let one = |row: StoreResult<Value>| row.map(|row| QueryResponse::single(op, row));
        let many = |rows: StoreResult<Vec<Value>>| {
            rows.map(|rows| QueryResponse::limited(op, rows, self.config.max_rows))
        };

        match request {
            QueryRequest::Work { work_id } => one(to_row(snap.work(*work_id)?)),
            QueryRequest::FindWork { title, author } => one(to_row(snap.find_work(title, author)?)),
            QueryRequest::Edition { edition_id } => one(to_row(snap.edition(*edition_id)?)),
            QueryRequest::EditionsOf { work_id } => many(to_rows(snap.editions_of(*work_id)?)),
            QueryRequest::Chunk { chunk_id } => one(to_row(snap.chunk(*chunk_id)?)),
            QueryRequest::ChunkByLine {
                edition_id,
                line_id,
            } => one(to_row(snap.chunk_by_line(*edition_id, line_id)?)),
            QueryRequest::ChunkAt {
                edition_id,
                page,
                line_no,
            } => one(to_row(snap.chunk_at(*edition_id, *page, *line_no)?)),
            QueryRequest::SemanticChunk { edition_id, sc_id } => {
                one(to_row(snap.semantic_chunk_by_id(*edition_id, sc_id)?))
            }
            QueryRequest::SemanticMembers { edition_id, sc_id } => {
                let sc = snap.semantic_chunk_by_id(*edition_id, sc_id)?;
                many(to_rows(snap.semantic_members(sc.pk)?))
            }
            QueryRequest::MicroUnit {
                edition_id,
                unit_id,
            } => one(to_row(snap.micro_unit_by_id(*edition_id, unit_id)?)),
            QueryRequest::MicroMembers {
                edition_id,
                unit_id,
            } => {
                let unit = snap.micro_unit_by_id(*edition_id, unit_id)?;
                many(to_rows(snap.micro_members(unit.pk)?))
            }
            QueryRequest::ChunksInPages {
                edition_id,
                first_page,
                last_page,
            } => many(to_rows(
                snap.chunks_in_pages(*edition_id, *first_page..=*last_page),
            )),
            QueryRequest::ChunksWithHash { content_hash } => {
                many(to_rows(snap.chunks_with_hash(content_hash)))
            }
            QueryRequest::DuplicatesOf { chunk_id } => many(to_rows(snap.duplicates_of(*chunk_id)?)),
            QueryRequest::SearchText { query } => many(to_rows(snap.search_text(query))),
            QueryRequest::UnitsWithThread { tag } => many(to_rows(snap.units_with_thread(tag))),
            QueryRequest::UnitsWithParticipant { name } => {
                many(to_rows(snap.units_with_participant(name)))
            }
            QueryRequest::UnitsWithNarrativeFunction { narrative_function } => {
                many(to_rows(snap.units_with_narrative_function(narrative_function)))
            }
            QueryRequest::SemanticChunkSummary { edition_id, sc_id } => {
                let sc = snap.semantic_chunk_by_id(*edition_id, sc_id)?;
                one(to_row(snap.semantic_chunk_summary(sc.pk)?))
            }
            QueryRequest::SemanticChunkSummaries { edition_id } => {
                many(to_rows(snap.semantic_chunk_summaries(*edition_id)?))
            }
            QueryRequest::SemanticFullText { edition_id, sc_id } => {
                let sc = snap.semantic_chunk_by_id(*edition_id, sc_id)?;
                one(Ok(Value::String(snap.semantic_full_text(sc.pk)?)))
            }
            QueryRequest::MicroUnitSummary {
                edition_id,
                unit_id,
            } => {
                let unit = snap.micro_unit_by_id(*edition_id, unit_id)?;
                one(to_row(snap.micro_unit_summary(unit.pk)?))
            }
            QueryRequest::MicroUnitSummaries { edition_id } => {
                many(to_rows(snap.micro_unit_summaries(*edition_id)?))
            }
            QueryRequest::CharacterInteractions { edition_id } => {
                many(to_rows(snap.character_interactions(*edition_id)?))
            }
            QueryRequest::InteractionsOf { name } => many(to_rows(snap.interactions_of(name))),
            QueryRequest::StoryThreads { edition_id } => {
                many(to_rows(snap.story_threads(*edition_id)?))
            }
            QueryRequest::StoryThread { tag } => many(to_rows(snap.story_thread(tag))),
            QueryRequest::Threads => many(to_rows(snap.threads())),
            QueryRequest::Stats => one(to_row(snap.stats())),
        }
    }
}
