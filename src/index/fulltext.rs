//! Inverted full-text index over chunk text
//!
//! Uses a language-agnostic tokenizer: text is lowercased and split on every
//! character that is not alphanumeric, so punctuation and apostrophes act as
//! separators ("l'homme" yields "l" and "homme").

use crate::model::{Chunk, ChunkId};
use std::collections::{BTreeSet, HashMap};

/// Split text into lowercase word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct FullTextIndex {
    postings: HashMap<String, BTreeSet<ChunkId>>,
}

impl FullTextIndex {
    pub fn insert(&mut self, chunk: &Chunk) {
        for token in tokenize(&chunk.text) {
            self.postings.entry(token).or_default().insert(chunk.id);
        }
    }

    pub fn remove(&mut self, chunk: &Chunk) {
        for token in tokenize(&chunk.text) {
            if let Some(ids) = self.postings.get_mut(&token) {
                ids.remove(&chunk.id);
                if ids.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
    }

    /// Chunks containing every token of `query`.
    ///
    /// A query without tokens matches nothing.
    pub fn search_all(&self, query: &str) -> BTreeSet<ChunkId> {
        let mut tokens = tokenize(query);
        tokens.sort();
        tokens.dedup();

        let mut lists = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match self.postings.get(token) {
                Some(ids) => lists.push(ids),
                None => return BTreeSet::new(),
            }
        }
        // Intersect starting from the rarest token
        lists.sort_by_key(|ids| ids.len());
        let Some((first, rest)) = lists.split_first() else {
            return BTreeSet::new();
        };
        first
            .iter()
            .filter(|id| rest.iter().all(|ids| ids.contains(*id)))
            .copied()
            .collect()
    }

    pub fn vocabulary(&self) -> usize {
        self.postings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::content_hash;
    use crate::model::{BoundingBox, EditionId};

    fn chunk(id: i64, text: &str) -> Chunk {
        Chunk {
            id: ChunkId::from_raw(id),
            edition_id: EditionId::from_raw(1),
            line_id: format!("L{id}"),
            page: 1,
            line_no: id as u32,
            bounding_box: BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            text: text.to_string(),
            content_hash: content_hash(text),
        }
    }

    #[test]
    fn tokenizer_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Les gens ne se parlent plus."),
            vec!["les", "gens", "ne", "se", "parlent", "plus"]
        );
        assert_eq!(tokenize("L'Été, déjà!"), vec!["l", "été", "déjà"]);
        assert!(tokenize(" ... ").is_empty());
    }

    #[test]
    fn search_is_a_boolean_and() {
        let mut idx = FullTextIndex::default();
        idx.insert(&chunk(1, "Les gens ne se parlent plus."));
        idx.insert(&chunk(2, "Les gens partent."));
        idx.insert(&chunk(3, "Personne ne parle."));

        let hits: Vec<i64> = idx.search_all("gens").iter().map(|c| c.get()).collect();
        assert_eq!(hits, vec![1, 2]);

        let hits: Vec<i64> = idx.search_all("GENS parlent").iter().map(|c| c.get()).collect();
        assert_eq!(hits, vec![1]);

        assert!(idx.search_all("gens absent").is_empty());
        assert!(idx.search_all("!!").is_empty());
    }

    #[test]
    fn remove_drops_empty_postings() {
        let mut idx = FullTextIndex::default();
        let c = chunk(1, "unique words here");
        idx.insert(&c);
        assert_eq!(idx.vocabulary(), 3);
        idx.remove(&c);
        assert_eq!(idx.vocabulary(), 0);
    }
}
