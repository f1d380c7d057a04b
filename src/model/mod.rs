//! Stored records: works, editions, OCR chunks, semantic chunks, micro-units
//! and their membership joins

mod chunk;
mod ids;
mod micro;
mod semantic;
mod work;


pub use chunk::{BoundingBox, Chunk, NewChunk};
pub use ids::{ChunkId, EditionId, MuPk, ScPk, SequenceKey, WorkId};
pub use micro::{
    CharacterDynamic, MicroUnit, MicroUnitMember, MicroUnitPatch, NewMicroUnit, UnitSummary,
};
pub use semantic::{
    NewSemanticChunk, SemanticChunk, SemanticChunkMember, SemanticChunkPatch, TextVariants,
};
pub use work::{Edition, EditionKey, NewEdition, Work};

pub(crate) use ids::Sequences;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Open key-value map for forward-compatible metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Optional first/last page covered by an aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageSpan {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl PageSpan {
    pub fn new(start: Option<u32>, end: Option<u32>) -> Self {
        Self { start, end }
    }
}
