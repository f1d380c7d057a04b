//! Surrogate keys for stored records
//!
//! Every table allocates its own monotonically increasing `i64` key. Keys
//! serialize as plain integers so they map directly onto SQLite `INTEGER`
//! columns and JSON numbers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_rules! surrogate_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw key value (as read back from storage)
            pub fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// Get the raw key value
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

surrogate_key!(
    /// Identifier of a [`Work`](super::Work)
    WorkId
);
surrogate_key!(
    /// Identifier of an [`Edition`](super::Edition)
    EditionId
);
surrogate_key!(
    /// Identifier of a raw OCR [`Chunk`](super::Chunk)
    ChunkId
);
surrogate_key!(
    /// Surrogate key of a [`SemanticChunk`](super::SemanticChunk)
    ScPk
);
surrogate_key!(
    /// Surrogate key of a [`MicroUnit`](super::MicroUnit)
    MuPk
);

/// Tables that allocate surrogate keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKey {
    Work,
    Edition,
    Chunk,
    SemanticChunk,
    MicroUnit,
}

impl SequenceKey {
    pub const ALL: [SequenceKey; 5] = [
        Self::Work,
        Self::Edition,
        Self::Chunk,
        Self::SemanticChunk,
        Self::MicroUnit,
    ];

    /// Name of the counter as persisted
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "works",
            Self::Edition => "editions",
            Self::Chunk => "chunks",
            Self::SemanticChunk => "semantic_chunks",
            Self::MicroUnit => "micro_units",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Next-key counters, one per table.
///
/// Counters only move forward: applying a record with key `k` raises the
/// counter to at least `k + 1`. Record stores persist the counters too, so a
/// key freed by a delete is not handed out again after a reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sequences {
    pub work: i64,
    pub edition: i64,
    pub chunk: i64,
    pub semantic_chunk: i64,
    pub micro_unit: i64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            work: 1,
            edition: 1,
            chunk: 1,
            semantic_chunk: 1,
            micro_unit: 1,
        }
    }
}

impl Sequences {
    pub fn observe(counter: &mut i64, raw: i64) {
        if raw >= *counter {
            *counter = raw + 1;
        }
    }

    pub fn counter_mut(&mut self, key: SequenceKey) -> &mut i64 {
        match key {
            SequenceKey::Work => &mut self.work,
            SequenceKey::Edition => &mut self.edition,
            SequenceKey::Chunk => &mut self.chunk,
            SequenceKey::SemanticChunk => &mut self.semantic_chunk,
            SequenceKey::MicroUnit => &mut self.micro_unit,
        }
    }

    /// Raise a counter to at least `next`
    pub fn reserve(&mut self, key: SequenceKey, next: i64) {
        let counter = self.counter_mut(key);
        if next > *counter {
            *counter = next;
        }
    }
}
