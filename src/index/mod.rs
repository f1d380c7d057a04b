//! Secondary indices, maintained synchronously with every committed write
//!
//! All structures are plain in-memory maps rebuilt from the record tables on
//! load; they never lag behind the data they index.

mod content;
mod fulltext;
mod positional;
mod tags;

pub use content::ContentHashIndex;
pub use fulltext::{tokenize, FullTextIndex};
pub use positional::PositionalIndex;
pub use tags::TagIndex;

use crate::model::{Chunk, MicroUnit};

/// The four logical indices of a store
#[derive(Debug, Default, Clone)]
pub struct Indexes {
    pub positional: PositionalIndex,
    pub content: ContentHashIndex,
    pub fulltext: FullTextIndex,
    pub tags: TagIndex,
}

impl Indexes {
    pub(crate) fn chunk_added(&mut self, chunk: &Chunk) {
        self.positional.insert(chunk);
        self.content.insert(chunk);
        self.fulltext.insert(chunk);
    }

    pub(crate) fn chunk_removed(&mut self, chunk: &Chunk) {
        self.positional.remove(chunk);
        self.content.remove(chunk);
        self.fulltext.remove(chunk);
    }

    pub(crate) fn unit_added(&mut self, unit: &MicroUnit) {
        self.tags.insert(unit);
    }

    pub(crate) fn unit_removed(&mut self, unit: &MicroUnit) {
        self.tags.remove(unit);
    }
}
