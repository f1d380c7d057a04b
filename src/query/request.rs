//! Query requests accepted by the read-only surface

use crate::derive::ContentHash;
use crate::model::{ChunkId, EditionId, WorkId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One read request. Serialized with its name in the `op` field:
/// `{"op": "chunk_at", "edition_id": 1, "page": 12, "line_no": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryRequest {
    // === Point lookups ===
    Work {
        work_id: WorkId,
    },
    FindWork {
        title: String,
        author: String,
    },
    Edition {
        edition_id: EditionId,
    },
    EditionsOf {
        work_id: WorkId,
    },
    Chunk {
        chunk_id: ChunkId,
    },
    ChunkByLine {
        edition_id: EditionId,
        line_id: String,
    },
    ChunkAt {
        edition_id: EditionId,
        page: u32,
        line_no: u32,
    },
    SemanticChunk {
        edition_id: EditionId,
        sc_id: String,
    },
    SemanticMembers {
        edition_id: EditionId,
        sc_id: String,
    },
    MicroUnit {
        edition_id: EditionId,
        unit_id: String,
    },
    MicroMembers {
        edition_id: EditionId,
        unit_id: String,
    },

    // === Index primitives ===
    /// Chunks on pages `first_page..=last_page`, in reading order
    ChunksInPages {
        edition_id: EditionId,
        first_page: u32,
        last_page: u32,
    },
    ChunksWithHash {
        #[schemars(description = "Lowercase hex SHA-256 of the chunk text")]
        content_hash: ContentHash,
    },
    DuplicatesOf {
        chunk_id: ChunkId,
    },
    /// Chunks containing every token of `query`
    SearchText {
        query: String,
    },
    UnitsWithThread {
        tag: String,
    },
    UnitsWithParticipant {
        name: String,
    },
    UnitsWithNarrativeFunction {
        narrative_function: String,
    },

    // === Projections ===
    SemanticChunkSummary {
        edition_id: EditionId,
        sc_id: String,
    },
    SemanticChunkSummaries {
        edition_id: EditionId,
    },
    SemanticFullText {
        edition_id: EditionId,
        sc_id: String,
    },
    MicroUnitSummary {
        edition_id: EditionId,
        unit_id: String,
    },
    MicroUnitSummaries {
        edition_id: EditionId,
    },
    CharacterInteractions {
        edition_id: EditionId,
    },
    InteractionsOf {
        name: String,
    },
    StoryThreads {
        edition_id: EditionId,
    },
    StoryThread {
        tag: String,
    },
    Threads,
    Stats,
}

impl QueryRequest {
    /// The `op` name this request serializes under
    pub fn op(&self) -> &'static str {
        match self {
            Self::Work { .. } => "work",
            Self::FindWork { .. } => "find_work",
            Self::Edition { .. } => "edition",
            Self::EditionsOf { .. } => "editions_of",
            Self::Chunk { .. } => "chunk",
            Self::ChunkByLine { .. } => "chunk_by_line",
            Self::ChunkAt { .. } => "chunk_at",
            Self::SemanticChunk { .. } => "semantic_chunk",
            Self::SemanticMembers { .. } => "semantic_members",
            Self::MicroUnit { .. } => "micro_unit",
            Self::MicroMembers { .. } => "micro_members",
            Self::ChunksInPages { .. } => "chunks_in_pages",
            Self::ChunksWithHash { .. } => "chunks_with_hash",
            Self::DuplicatesOf { .. } => "duplicates_of",
            Self::SearchText { .. } => "search_text",
            Self::UnitsWithThread { .. } => "units_with_thread",
            Self::UnitsWithParticipant { .. } => "units_with_participant",
            Self::UnitsWithNarrativeFunction { .. } => "units_with_narrative_function",
            Self::SemanticChunkSummary { .. } => "semantic_chunk_summary",
            Self::SemanticChunkSummaries { .. } => "semantic_chunk_summaries",
            Self::SemanticFullText { .. } => "semantic_full_text",
            Self::MicroUnitSummary { .. } => "micro_unit_summary",
            Self::MicroUnitSummaries { .. } => "micro_unit_summaries",
            Self::CharacterInteractions { .. } => "character_interactions",
            Self::InteractionsOf { .. } => "interactions_of",
            Self::StoryThreads { .. } => "story_threads",
            Self::StoryThread { .. } => "story_thread",
            Self::Threads => "threads",
            Self::Stats => "stats",
        }
    }
}

/// Write operations of the store, by name
pub const WRITE_OPS: &[&str] = &[
    "ensure_work",
    "update_work_notes",
    "delete_work",
    "ensure_edition",
    "update_edition_notes",
    "delete_edition",
    "insert_chunk",
    "delete_chunk",
    "create_semantic_chunk",
    "assemble_semantic_chunk",
    "update_semantic_chunk",
    "delete_semantic_chunk",
    "add_semantic_member",
    "update_semantic_member",
    "delete_semantic_member",
    "create_micro_unit",
    "assemble_micro_unit",
    "update_micro_unit",
    "delete_micro_unit",
    "add_micro_member",
    "update_micro_member",
    "delete_micro_member",
];

const WRITE_VERBS: &[&str] = &[
    "insert", "update", "delete", "create", "assemble", "ensure", "add", "drop", "remove",
    "put", "set", "alter", "truncate", "replace", "upsert",
];

/// Whether `op` names a mutation: a known write op, or anything led by a
/// write verb (`delete`, `drop_table`, `upsert_chunk`, ...)
pub fn is_write_op(op: &str) -> bool {
    let op = op.trim().to_ascii_lowercase();
    if WRITE_OPS.contains(&op.as_str()) {
        return true;
    }
    let verb = op.split(['_', '-', ' ']).next().unwrap_or_default();
    WRITE_VERBS.contains(&verb)
}
