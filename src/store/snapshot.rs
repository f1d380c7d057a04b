//! Consistent read views
//!
//! A [`Snapshot`] shares one committed state: every lookup, index query and
//! projection made through it sees that state, never a write in progress.
//! Writers do not wait for snapshots; later commits are simply not visible
//! through an older one.

use super::error::{StoreError, StoreResult};
use super::state::State;
use crate::derive::{content_hash, ContentHash};
use crate::model::{
    Chunk, ChunkId, Edition, EditionId, MicroUnit, MicroUnitMember, MuPk, ScPk, SemanticChunk,
    SemanticChunkMember, Work, WorkId,
};
use crate::projection::{
    self, CharacterInteraction, MicroUnitSummary, SemanticChunkSummary, StoryThreadEntry,
};
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Row counts per table, plus index sizes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct StoreStats {
    pub works: usize,
    pub editions: usize,
    pub chunks: usize,
    pub semantic_chunks: usize,
    pub semantic_chunk_members: usize,
    pub micro_units: usize,
    pub micro_unit_members: usize,
    pub distinct_hashes: usize,
    pub vocabulary: usize,
}

/// A violated invariant found by [`Snapshot::verify_integrity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A membership row's edition differs from its parent's
    EditionMismatch {
        parent: &'static str,
        key: String,
        got: EditionId,
        expected: EditionId,
    },
    /// A membership row whose parent does not exist
    OrphanMember { parent: &'static str, key: String },
    /// A membership row whose leaf does not exist
    DanglingMember { parent: &'static str, key: String },
    /// A record whose owning edition or work does not exist
    DanglingRecord { entity: &'static str, key: String },
    /// A chunk whose stored hash does not match its text
    HashMismatch { chunk: ChunkId },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EditionMismatch {
                parent,
                key,
                got,
                expected,
            } => write!(
                f,
                "{parent} member {key} has edition {got}, parent has {expected}"
            ),
            Self::OrphanMember { parent, key } => write!(f, "{parent} member {key} has no parent"),
            Self::DanglingMember { parent, key } => {
                write!(f, "{parent} member {key} points at a missing record")
            }
            Self::DanglingRecord { entity, key } => {
                write!(f, "{entity} {key} references a missing owner")
            }
            Self::HashMismatch { chunk } => write!(f, "chunk {chunk} content hash does not match its text"),
        }
    }
}

/// Audit a whole state. Empty means every invariant holds.
pub(crate) fn audit(state: &State) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    for edition in state.editions.values() {
        if !state.works.contains_key(&edition.work_id) {
            issues.push(IntegrityIssue::DanglingRecord {
                entity: "edition",
                key: edition.id.to_string(),
            });
        }
    }
    for chunk in state.chunks.values() {
        if !state.editions.contains_key(&chunk.edition_id) {
            issues.push(IntegrityIssue::DanglingRecord {
                entity: "chunk",
                key: chunk.id.to_string(),
            });
        }
        if content_hash(&chunk.text) != chunk.content_hash {
            issues.push(IntegrityIssue::HashMismatch { chunk: chunk.id });
        }
    }
    for sc in state.semantic_chunks.values() {
        if !state.editions.contains_key(&sc.edition_id) {
            issues.push(IntegrityIssue::DanglingRecord {
                entity: "semantic chunk",
                key: sc.sc_id.clone(),
            });
        }
    }
    for unit in state.micro_units.values() {
        if !state.editions.contains_key(&unit.edition_id) {
            issues.push(IntegrityIssue::DanglingRecord {
                entity: "micro-unit",
                key: unit.unit_id.clone(),
            });
        }
    }

    for (pk, members) in &state.semantic_members {
        let parent = state.semantic_chunks.get(pk);
        for member in members.values() {
            let key = format!("(sc_pk={pk}, line_id={})", member.line_id);
            match parent {
                None => issues.push(IntegrityIssue::OrphanMember {
                    parent: "semantic chunk",
                    key,
                }),
                Some(sc) if sc.edition_id != member.edition_id => {
                    issues.push(IntegrityIssue::EditionMismatch {
                        parent: "semantic chunk",
                        key,
                        got: member.edition_id,
                        expected: sc.edition_id,
                    })
                }
                Some(_) if state.chunk_by_line(member.edition_id, &member.line_id).is_none() => {
                    issues.push(IntegrityIssue::DanglingMember {
                        parent: "semantic chunk",
                        key,
                    })
                }
                Some(_) => {}
            }
        }
    }

    for (pk, members) in &state.micro_members {
        let parent = state.micro_units.get(pk);
        for member in members.values() {
            let key = format!("(mu_pk={pk}, sc_id={})", member.sc_id);
            match parent {
                None => issues.push(IntegrityIssue::OrphanMember {
                    parent: "micro-unit",
                    key,
                }),
                Some(unit) if unit.edition_id != member.edition_id => {
                    issues.push(IntegrityIssue::EditionMismatch {
                        parent: "micro-unit",
                        key,
                        got: member.edition_id,
                        expected: unit.edition_id,
                    })
                }
                Some(_) if state.semantic_by_sc_id(member.edition_id, &member.sc_id).is_none() => {
                    issues.push(IntegrityIssue::DanglingMember {
                        parent: "micro-unit",
                        key,
                    })
                }
                Some(_) => {}
            }
        }
    }

    issues
}

/// Read view over one committed state
#[derive(Clone)]
pub struct Snapshot {
    state: Arc<State>,
}

impl Snapshot {
    pub(crate) fn new(state: Arc<State>) -> Self {
        Self { state }
    }

    // === Point lookups ===

    pub fn work(&self, id: WorkId) -> StoreResult<&Work> {
        self.state
            .works
            .get(&id)
            .ok_or_else(|| StoreError::not_found("work", id))
    }

    pub fn find_work(&self, title: &str, author: &str) -> StoreResult<&Work> {
        self.state
            .work_by_key(title, author)
            .ok_or_else(|| StoreError::not_found("work", format!("({title}, {author})")))
    }

    pub fn edition(&self, id: EditionId) -> StoreResult<&Edition> {
        self.state
            .editions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("edition", id))
    }

    /// Editions of a work, in id order
    pub fn editions_of(&self, work_id: WorkId) -> StoreResult<Vec<&Edition>> {
        self.work(work_id)?;
        Ok(self.state.editions_of(work_id).collect())
    }

    pub fn chunk(&self, id: ChunkId) -> StoreResult<&Chunk> {
        self.state
            .chunks
            .get(&id)
            .ok_or_else(|| StoreError::not_found("chunk", id))
    }

    pub fn chunk_by_line(&self, edition: EditionId, line_id: &str) -> StoreResult<&Chunk> {
        self.state
            .chunk_by_line(edition, line_id)
            .ok_or_else(|| {
                StoreError::not_found("chunk", format!("(edition={edition}, line_id={line_id})"))
            })
    }

    pub fn chunk_at(&self, edition: EditionId, page: u32, line_no: u32) -> StoreResult<&Chunk> {
        self.state.chunk_at(edition, page, line_no).ok_or_else(|| {
            StoreError::not_found(
                "chunk",
                format!("(edition={edition}, page={page}, line_no={line_no})"),
            )
        })
    }

    pub fn semantic_chunk(&self, pk: ScPk) -> StoreResult<&SemanticChunk> {
        self.state
            .semantic_chunks
            .get(&pk)
            .ok_or_else(|| StoreError::not_found("semantic chunk", pk))
    }

    pub fn semantic_chunk_by_id(&self, edition: EditionId, sc_id: &str) -> StoreResult<&SemanticChunk> {
        self.state.semantic_by_sc_id(edition, sc_id).ok_or_else(|| {
            StoreError::not_found("semantic chunk", format!("(edition={edition}, sc_id={sc_id})"))
        })
    }

    /// Members in `ord` order
    pub fn semantic_members(&self, pk: ScPk) -> StoreResult<Vec<&SemanticChunkMember>> {
        self.semantic_chunk(pk)?;
        Ok(self.state.semantic_members_of(pk))
    }

    pub fn micro_unit(&self, pk: MuPk) -> StoreResult<&MicroUnit> {
        self.state
            .micro_units
            .get(&pk)
            .ok_or_else(|| StoreError::not_found("micro-unit", pk))
    }

    pub fn micro_unit_by_id(&self, edition: EditionId, unit_id: &str) -> StoreResult<&MicroUnit> {
        self.state.micro_by_unit_id(edition, unit_id).ok_or_else(|| {
            StoreError::not_found("micro-unit", format!("(edition={edition}, unit_id={unit_id})"))
        })
    }

    /// Members in `ord` order
    pub fn micro_members(&self, pk: MuPk) -> StoreResult<Vec<&MicroUnitMember>> {
        self.micro_unit(pk)?;
        Ok(self.state.micro_members_of(pk))
    }

    // === Index primitives ===

    fn chunks_for(&self, ids: impl IntoIterator<Item = ChunkId>) -> Vec<&Chunk> {
        ids.into_iter()
            .filter_map(|id| self.state.chunks.get(&id))
            .collect()
    }

    fn units_for(&self, pks: impl IntoIterator<Item = MuPk>) -> Vec<&MicroUnit> {
        pks.into_iter()
            .filter_map(|pk| self.state.micro_units.get(&pk))
            .collect()
    }

    /// Chunks of an edition on the given pages, in reading order
    pub fn chunks_in_pages(&self, edition: EditionId, pages: RangeInclusive<u32>) -> Vec<&Chunk> {
        self.chunks_for(self.state.indexes.positional.page_range(edition, pages))
    }

    /// Chunks whose text hashes to `hash`, in any edition
    pub fn chunks_with_hash(&self, hash: &ContentHash) -> Vec<&Chunk> {
        self.chunks_for(self.state.indexes.content.get(hash))
    }

    /// Other chunks carrying exactly the same text as `id`
    pub fn duplicates_of(&self, id: ChunkId) -> StoreResult<Vec<&Chunk>> {
        let chunk = self.chunk(id)?;
        Ok(self
            .chunks_with_hash(&chunk.content_hash)
            .into_iter()
            .filter(|c| c.id != id)
            .collect())
    }

    /// Chunks containing every token of `query`, in id order
    pub fn search_text(&self, query: &str) -> Vec<&Chunk> {
        self.chunks_for(self.state.indexes.fulltext.search_all(query))
    }

    pub fn units_with_thread(&self, tag: &str) -> Vec<&MicroUnit> {
        self.units_for(self.state.indexes.tags.with_thread(tag))
    }

    /// Units where `name` appears on either side of a character dynamic
    pub fn units_with_participant(&self, name: &str) -> Vec<&MicroUnit> {
        self.units_for(self.state.indexes.tags.with_participant(name))
    }

    pub fn units_with_narrative_function(&self, function: &str) -> Vec<&MicroUnit> {
        self.units_for(self.state.indexes.tags.with_narrative_function(function))
    }

    /// Every story thread tag in use
    pub fn threads(&self) -> Vec<String> {
        self.state
            .indexes
            .tags
            .threads()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    // === Projections ===

    pub fn semantic_chunk_summary(&self, pk: ScPk) -> StoreResult<SemanticChunkSummary> {
        let sc = self.semantic_chunk(pk)?;
        Ok(projection::semantic_summary(&self.state, sc))
    }

    /// Summaries of every semantic chunk in an edition, in `sc_id` order
    pub fn semantic_chunk_summaries(&self, edition: EditionId) -> StoreResult<Vec<SemanticChunkSummary>> {
        self.edition(edition)?;
        Ok(self
            .state
            .semantic_in_edition(edition)
            .filter_map(|pk| self.state.semantic_chunks.get(&pk))
            .map(|sc| projection::semantic_summary(&self.state, sc))
            .collect())
    }

    /// Member chunk texts in `ord` order, joined by single spaces
    pub fn semantic_full_text(&self, pk: ScPk) -> StoreResult<String> {
        self.semantic_chunk(pk)?;
        Ok(projection::semantic_full_text(&self.state, pk))
    }

    pub fn micro_unit_summary(&self, pk: MuPk) -> StoreResult<MicroUnitSummary> {
        let unit = self.micro_unit(pk)?;
        Ok(projection::micro_summary(&self.state, unit))
    }

    /// Summaries of every micro-unit in an edition, in `unit_id` order
    pub fn micro_unit_summaries(&self, edition: EditionId) -> StoreResult<Vec<MicroUnitSummary>> {
        self.edition(edition)?;
        Ok(self
            .state
            .micro_in_edition(edition)
            .filter_map(|pk| self.state.micro_units.get(&pk))
            .map(|unit| projection::micro_summary(&self.state, unit))
            .collect())
    }

    pub fn character_interactions(&self, edition: EditionId) -> StoreResult<Vec<CharacterInteraction>> {
        self.edition(edition)?;
        Ok(projection::character_interactions(&self.state, edition))
    }

    /// Interactions of the units where `name` participates
    pub fn interactions_of(&self, name: &str) -> Vec<CharacterInteraction> {
        self.units_with_participant(name)
            .into_iter()
            .flat_map(projection::interactions_of)
            .filter(|row| row.from == name || row.to == name)
            .collect()
    }

    /// `(unit, tag)` rows of an edition, ordered by tag then start page
    pub fn story_threads(&self, edition: EditionId) -> StoreResult<Vec<StoryThreadEntry>> {
        self.edition(edition)?;
        Ok(projection::story_threads(&self.state, edition))
    }

    /// Rows for one tag across all editions, ordered by start page
    pub fn story_thread(&self, tag: &str) -> Vec<StoryThreadEntry> {
        projection::story_thread(&self.state, tag)
    }

    // === Maintenance ===

    pub fn stats(&self) -> StoreStats {
        let state = &*self.state;
        StoreStats {
            works: state.works.len(),
            editions: state.editions.len(),
            chunks: state.chunks.len(),
            semantic_chunks: state.semantic_chunks.len(),
            semantic_chunk_members: state.semantic_members.values().map(|m| m.len()).sum(),
            micro_units: state.micro_units.len(),
            micro_unit_members: state.micro_members.values().map(|m| m.len()).sum(),
            distinct_hashes: state.indexes.content.distinct(),
            vocabulary: state.indexes.fulltext.vocabulary(),
        }
    }

    /// Re-check every stored invariant. Empty means the store is consistent.
    pub fn verify_integrity(&self) -> Vec<IntegrityIssue> {
        audit(&self.state)
    }
}
