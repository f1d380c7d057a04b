//! Cascade planning for deletes
//!
//! Deletes are expanded into an explicit, children-first list of row
//! deletions. Every membership visited on the way is re-checked against its
//! parent; any inconsistency aborts the plan before anything is committed.

use super::changeset::{ChangeSet, Op};
use super::error::{StoreError, StoreResult};
use super::state::State;
use crate::model::{ChunkId, EditionId, MuPk, ScPk};
use std::collections::HashSet;
use tracing::warn;

pub(crate) struct Cascade<'a> {
    state: &'a State,
    changes: ChangeSet,
    micro_members: HashSet<(MuPk, String)>,
    semantic_members: HashSet<(ScPk, String)>,
}

fn broken(parent: &'static str, got: EditionId, expected: EditionId) -> StoreError {
    warn!(parent, %got, %expected, "cascade aborted on inconsistent membership");
    StoreError::Consistency {
        parent,
        got,
        expected,
    }
}

impl<'a> Cascade<'a> {
    pub fn new(state: &'a State) -> Self {
        Self {
            state,
            changes: ChangeSet::new(),
            micro_members: HashSet::new(),
            semantic_members: HashSet::new(),
        }
    }

    pub fn finish(self) -> ChangeSet {
        self.changes
    }

    fn drop_micro_member(&mut self, mu_pk: MuPk, sc_id: &str) -> StoreResult<()> {
        if !self.micro_members.insert((mu_pk, sc_id.to_string())) {
            return Ok(());
        }
        let state = self.state;
        let (Some(member), Some(unit)) = (state.micro_member(mu_pk, sc_id), state.micro_units.get(&mu_pk))
        else {
            return Err(StoreError::not_found(
                "micro-unit member",
                format!("mu_pk={mu_pk}, sc_id={sc_id}"),
            ));
        };
        if member.edition_id != unit.edition_id {
            return Err(broken("micro-unit", member.edition_id, unit.edition_id));
        }
        self.changes.push(Op::DeleteMicroMember {
            mu_pk,
            sc_id: sc_id.to_string(),
        });
        Ok(())
    }

    fn drop_semantic_member(&mut self, sc_pk: ScPk, line_id: &str) -> StoreResult<()> {
        if !self.semantic_members.insert((sc_pk, line_id.to_string())) {
            return Ok(());
        }
        let state = self.state;
        let (Some(member), Some(sc)) = (
            state.semantic_member(sc_pk, line_id),
            state.semantic_chunks.get(&sc_pk),
        ) else {
            return Err(StoreError::not_found(
                "semantic chunk member",
                format!("sc_pk={sc_pk}, line_id={line_id}"),
            ));
        };
        if member.edition_id != sc.edition_id {
            return Err(broken("semantic chunk", member.edition_id, sc.edition_id));
        }
        self.changes.push(Op::DeleteSemanticMember {
            sc_pk,
            line_id: line_id.to_string(),
        });
        Ok(())
    }

    /// A single membership row
    pub fn micro_member(&mut self, mu_pk: MuPk, sc_id: &str) -> StoreResult<()> {
        self.drop_micro_member(mu_pk, sc_id)
    }

    /// A single membership row
    pub fn semantic_member(&mut self, sc_pk: ScPk, line_id: &str) -> StoreResult<()> {
        self.drop_semantic_member(sc_pk, line_id)
    }

    /// A micro-unit and its members
    pub fn micro_unit(&mut self, pk: MuPk) -> StoreResult<()> {
        let state = self.state;
        if !state.micro_units.contains_key(&pk) {
            return Err(StoreError::not_found("micro-unit", pk));
        }
        for member in state.micro_members_of(pk) {
            self.drop_micro_member(pk, &member.sc_id)?;
        }
        self.changes.push(Op::DeleteMicroUnit(pk));
        Ok(())
    }

    /// A semantic chunk, its members, and micro-unit memberships pointing at it
    pub fn semantic_chunk(&mut self, pk: ScPk) -> StoreResult<()> {
        let state = self.state;
        let sc = state
            .semantic_chunks
            .get(&pk)
            .ok_or_else(|| StoreError::not_found("semantic chunk", pk))?;
        if let Some(units) = state.sc_refs.get(&(sc.edition_id, sc.sc_id.clone())) {
            for mu_pk in units {
                self.drop_micro_member(*mu_pk, &sc.sc_id)?;
            }
        }
        for member in state.semantic_members_of(pk) {
            self.drop_semantic_member(pk, &member.line_id)?;
        }
        self.changes.push(Op::DeleteSemanticChunk(pk));
        Ok(())
    }

    /// A chunk and the semantic memberships pointing at it
    pub fn chunk(&mut self, id: ChunkId) -> StoreResult<()> {
        let state = self.state;
        let chunk = state
            .chunks
            .get(&id)
            .ok_or_else(|| StoreError::not_found("chunk", id))?;
        if let Some(parents) = state.line_refs.get(&(chunk.edition_id, chunk.line_id.clone())) {
            for sc_pk in parents {
                self.drop_semantic_member(*sc_pk, &chunk.line_id)?;
            }
        }
        self.changes.push(Op::DeleteChunk(id));
        Ok(())
    }

    /// An edition and its whole aggregate tree
    pub fn edition(&mut self, id: EditionId) -> StoreResult<()> {
        let state = self.state;
        if !state.editions.contains_key(&id) {
            return Err(StoreError::not_found("edition", id));
        }
        for pk in state.micro_in_edition(id) {
            self.micro_unit(pk)?;
        }
        for pk in state.semantic_in_edition(id) {
            self.semantic_chunk(pk)?;
        }
        for chunk_id in state.indexes.positional.edition(id) {
            self.chunk(chunk_id)?;
        }
        self.changes.push(Op::DeleteEdition(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::content_hash;
    use crate::model::{
        BoundingBox, Chunk, Edition, MicroUnit, MicroUnitMember, SemanticChunk,
        SemanticChunkMember, WorkId,
    };
    use chrono::Utc;

    fn e(id: i64) -> EditionId {
        EditionId::from_raw(id)
    }

    fn tree() -> State {
        let now = Utc::now();
        let mut state = State::default();
        state.apply(Op::PutEdition(Edition {
            id: e(1),
            work_id: WorkId::from_raw(1),
            language: "fr".into(),
            publisher: None,
            year: None,
            isbn: None,
            source_archive_id: None,
            notes: None,
        }));
        state.apply(Op::PutChunk(Chunk {
            id: ChunkId::from_raw(1),
            edition_id: e(1),
            line_id: "FR77".into(),
            page: 12,
            line_no: 3,
            bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap(),
            text: "t".into(),
            content_hash: content_hash("t"),
        }));
        state.apply(Op::PutSemanticChunk(SemanticChunk {
            pk: ScPk::from_raw(1),
            edition_id: e(1),
            sc_id: "SC_001".into(),
            page_start: None,
            page_end: None,
            embedding_text: None,
            embedding_summary: None,
            paraphrase: None,
            word_count: None,
            sentence_count: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }));
        state.apply(Op::PutSemanticMember(SemanticChunkMember {
            sc_pk: ScPk::from_raw(1),
            edition_id: e(1),
            line_id: "FR77".into(),
            ord: 1,
        }));
        state.apply(Op::PutMicroUnit(MicroUnit {
            pk: MuPk::from_raw(1),
            edition_id: e(1),
            unit_id: "MU_001".into(),
            page_start: None,
            page_end: None,
            summary: Default::default(),
            character_dynamics: Vec::new(),
            story_threads: Default::default(),
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }));
        state.apply(Op::PutMicroMember(MicroUnitMember {
            mu_pk: MuPk::from_raw(1),
            edition_id: e(1),
            sc_id: "SC_001".into(),
            ord: 1,
        }));
        state
    }

    #[test]
    fn edition_cascade_lists_children_first_without_duplicates() {
        let state = tree();
        let mut cascade = Cascade::new(&state);
        cascade.edition(e(1)).unwrap();
        let changes = cascade.finish();
        assert_eq!(
            changes.ops(),
            &[
                Op::DeleteMicroMember {
                    mu_pk: MuPk::from_raw(1),
                    sc_id: "SC_001".into()
                },
                Op::DeleteMicroUnit(MuPk::from_raw(1)),
                Op::DeleteSemanticMember {
                    sc_pk: ScPk::from_raw(1),
                    line_id: "FR77".into()
                },
                Op::DeleteSemanticChunk(ScPk::from_raw(1)),
                Op::DeleteChunk(ChunkId::from_raw(1)),
                Op::DeleteEdition(e(1)),
            ]
        );
    }

    #[test]
    fn corrupted_member_aborts_the_cascade() {
        let mut state = tree();
        // Bypass the enforcer to simulate a corrupted row
        state.apply(Op::PutMicroMember(MicroUnitMember {
            mu_pk: MuPk::from_raw(1),
            edition_id: e(2),
            sc_id: "SC_009".into(),
            ord: 2,
        }));
        let mut cascade = Cascade::new(&state);
        let err = cascade.edition(e(1)).unwrap_err();
        assert!(matches!(err, StoreError::Consistency { .. }));
    }

    #[test]
    fn missing_target_is_not_found() {
        let state = State::default();
        let mut cascade = Cascade::new(&state);
        assert!(cascade.chunk(ChunkId::from_raw(9)).unwrap_err().is_not_found());
    }
}
