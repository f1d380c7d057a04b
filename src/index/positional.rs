//! Positional lookup: `(edition, page, line_no)` and `(edition, line_id)`

use crate::model::{Chunk, ChunkId, EditionId};
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

#[derive(Debug, Default, Clone)]
pub struct PositionalIndex {
    by_position: BTreeMap<(EditionId, u32, u32), ChunkId>,
    by_line: HashMap<(EditionId, String), ChunkId>,
}

impl PositionalIndex {
    pub fn insert(&mut self, chunk: &Chunk) {
        self.by_position
            .insert((chunk.edition_id, chunk.page, chunk.line_no), chunk.id);
        self.by_line
            .insert((chunk.edition_id, chunk.line_id.clone()), chunk.id);
    }

    pub fn remove(&mut self, chunk: &Chunk) {
        self.by_position
            .remove(&(chunk.edition_id, chunk.page, chunk.line_no));
        self.by_line.remove(&(chunk.edition_id, chunk.line_id.clone()));
    }

    pub fn at(&self, edition: EditionId, page: u32, line_no: u32) -> Option<ChunkId> {
        self.by_position.get(&(edition, page, line_no)).copied()
    }

    pub fn by_line_id(&self, edition: EditionId, line_id: &str) -> Option<ChunkId> {
        self.by_line.get(&(edition, line_id.to_string())).copied()
    }

    /// Chunks of one edition on the given pages, in reading order
    pub fn page_range(
        &self,
        edition: EditionId,
        pages: RangeInclusive<u32>,
    ) -> impl Iterator<Item = ChunkId> + '_ {
        let (first, last) = (*pages.start(), *pages.end());
        let range = if first <= last {
            Some((edition, first, 0)..=(edition, last, u32::MAX))
        } else {
            None
        };
        range
            .into_iter()
            .flat_map(move |r| self.by_position.range(r).map(|(_, id)| *id))
    }

    /// Every chunk of an edition, in reading order
    pub fn edition(&self, edition: EditionId) -> impl Iterator<Item = ChunkId> + '_ {
        self.page_range(edition, 0..=u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::content_hash;
    use crate::model::BoundingBox;

    fn chunk(id: i64, edition: i64, line_id: &str, page: u32, line_no: u32) -> Chunk {
        Chunk {
            id: ChunkId::from_raw(id),
            edition_id: EditionId::from_raw(edition),
            line_id: line_id.to_string(),
            page,
            line_no,
            bounding_box: BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            text: String::new(),
            content_hash: content_hash(""),
        }
    }

    #[test]
    fn page_range_is_ordered_and_edition_scoped() {
        let mut idx = PositionalIndex::default();
        idx.insert(&chunk(1, 1, "a", 3, 2));
        idx.insert(&chunk(2, 1, "b", 3, 1));
        idx.insert(&chunk(3, 1, "c", 5, 1));
        idx.insert(&chunk(4, 2, "d", 3, 1));

        let ids: Vec<i64> = idx
            .page_range(EditionId::from_raw(1), 3..=4)
            .map(|c| c.get())
            .collect();
        assert_eq!(ids, vec![2, 1]);

        let all: Vec<i64> = idx.edition(EditionId::from_raw(1)).map(|c| c.get()).collect();
        assert_eq!(all, vec![2, 1, 3]);
    }

    #[test]
    fn reversed_range_is_empty() {
        let mut idx = PositionalIndex::default();
        idx.insert(&chunk(1, 1, "a", 3, 2));
        assert_eq!(idx.page_range(EditionId::from_raw(1), 4..=3).count(), 0);
    }

    #[test]
    fn remove_clears_both_keys() {
        let mut idx = PositionalIndex::default();
        let c = chunk(1, 1, "FR77", 12, 3);
        idx.insert(&c);
        assert_eq!(idx.at(c.edition_id, 12, 3), Some(c.id));
        assert_eq!(idx.by_line_id(c.edition_id, "FR77"), Some(c.id));
        idx.remove(&c);
        assert_eq!(idx.at(c.edition_id, 12, 3), None);
        assert_eq!(idx.by_line_id(c.edition_id, "FR77"), None);
        assert_eq!(idx.edition(c.edition_id).next(), None);
    }
}
