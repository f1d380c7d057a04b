//! Palimpsest: a hierarchical text-segmentation store
//!
//! Stores literary works as layers of progressively coarser segmentation and
//! keeps those layers consistent with each other.
//!
//! # Core Concepts
//!
//! - **Works and editions**: a work and its concrete printings or translations
//! - **Chunks**: OCR lines with page/line position, bounding box and a content hash
//! - **Semantic chunks**: ordered groups of lines with derived text variants
//! - **Micro-units**: ordered groups of semantic chunks with narrative metadata
//!
//! Every membership row carries a copy of its parent's edition, and a write
//! that would let the two disagree is rejected. Secondary indices are
//! updated with each write; projections are computed on demand.
//!
//! # Example
//!
//! ```
//! use palimpsest::{NewChunk, NewEdition, NewMicroUnit, NewSemanticChunk, Palimpsest};
//!
//! let store = Palimpsest::new();
//! let work = store.ensure_work("Voyage au bout de la nuit", "Céline", None).unwrap();
//! let ed = store
//!     .ensure_edition(work, NewEdition::new("fr").publisher("Gallimard").year(1986))
//!     .unwrap();
//! store
//!     .insert_chunk(ed, NewChunk::new("FR77", 12, 3, [0.0, 0.0, 10.0, 10.0], "Les gens ne se parlent plus."))
//!     .unwrap();
//! let sc = store.assemble_semantic_chunk(ed, NewSemanticChunk::new("SC_001"), &["FR77"]).unwrap();
//! store.assemble_micro_unit(ed, NewMicroUnit::new("MU_001"), &["SC_001"]).unwrap();
//!
//! let snap = store.snapshot();
//! assert_eq!(snap.semantic_full_text(sc).unwrap(), "Les gens ne se parlent plus.");
//! ```

pub mod config;
pub mod derive;
pub mod index;
pub mod model;
pub mod projection;
pub mod query;
pub mod storage;
pub mod store;

pub use config::{default_db_path, QueryConfig, StoreConfig, StoreLocation};
pub use derive::{content_hash, Clock, ContentHash, FixedClock, StepClock, SystemClock};
pub use model::{
    BoundingBox, CharacterDynamic, Chunk, ChunkId, Edition, EditionId, Metadata, MicroUnit,
    MicroUnitMember, MicroUnitPatch, MuPk, NewChunk, NewEdition, NewMicroUnit, NewSemanticChunk,
    PageSpan, ScPk, SemanticChunk, SemanticChunkMember, SemanticChunkPatch, SequenceKey,
    TextVariants, UnitSummary, Work, WorkId,
};
pub use projection::{
    CharacterInteraction, MicroUnitSummary, SemanticChunkSummary, StoryThreadEntry,
};
pub use query::{QueryRequest, QueryResponse, QuerySurface};
pub use storage::{OpenStore, RecordStore, SqliteStore, StorageError, StorageResult};
pub use store::{IntegrityIssue, Palimpsest, Snapshot, StoreError, StoreResult, StoreStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
