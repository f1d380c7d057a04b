//! Content-hash lookup for duplicate text detection

use crate::derive::ContentHash;
use crate::model::{Chunk, ChunkId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub struct ContentHashIndex {
    by_hash: HashMap<ContentHash, BTreeSet<ChunkId>>,
}

impl ContentHashIndex {
    pub fn insert(&mut self, chunk: &Chunk) {
        self.by_hash
            .entry(chunk.content_hash.clone())
            .or_default()
            .insert(chunk.id);
    }

    pub fn remove(&mut self, chunk: &Chunk) {
        if let Some(ids) = self.by_hash.get_mut(&chunk.content_hash) {
            ids.remove(&chunk.id);
            if ids.is_empty() {
                self.by_hash.remove(&chunk.content_hash);
            }
        }
    }

    /// All chunks whose text hashes to `hash`, ascending by id
    pub fn get(&self, hash: &ContentHash) -> impl Iterator<Item = ChunkId> + '_ {
        self.by_hash.get(hash).into_iter().flatten().copied()
    }

    /// Number of distinct texts indexed
    pub fn distinct(&self) -> usize {
        self.by_hash.len()
    }
}
