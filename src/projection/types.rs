//! Projection row types

use crate::model::{EditionId, Metadata, MuPk, PageSpan, ScPk, TextVariants};
use serde::Serialize;

/// A semantic chunk with its ordered line membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticChunkSummary {
    pub pk: ScPk,
    pub edition_id: EditionId,
    pub sc_id: String,
    pub pages: PageSpan,
    pub text: TextVariants,
    pub word_count: Option<u32>,
    pub sentence_count: Option<u32>,
    pub member_count: usize,
    /// Member lines in `ord` order
    pub line_ids: Vec<String>,
}

/// A micro-unit with its summary flattened and its ordered membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicroUnitSummary {
    pub pk: MuPk,
    pub edition_id: EditionId,
    pub unit_id: String,
    pub pages: PageSpan,
    pub what_happens: Option<String>,
    pub narrative_function: Option<String>,
    pub significance: Option<String>,
    pub story_threads: Vec<String>,
    pub member_count: usize,
    /// Member semantic chunks in `ord` order
    pub semantic_chunk_ids: Vec<String>,
    /// Open summary keys, carried next to the named ones
    #[serde(flatten)]
    pub extra: Metadata,
}

/// One `character_dynamics` entry joined with its unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterInteraction {
    pub unit_pk: MuPk,
    pub unit_id: String,
    pub edition_id: EditionId,
    pub pages: PageSpan,
    pub from: String,
    pub to: String,
    pub relation_type: Option<String>,
    pub interaction: Option<String>,
    pub evolution: Option<String>,
}

/// One `(unit, tag)` pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryThreadEntry {
    pub tag: String,
    pub unit_pk: MuPk,
    pub unit_id: String,
    pub edition_id: EditionId,
    pub pages: PageSpan,
}
