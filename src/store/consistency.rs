//! Membership consistency enforcement
//!
//! A membership row carries a denormalized copy of its parent's
//! `edition_id`. Before any membership insert or update is committed, the
//! parent is resolved by its surrogate key and the copy is compared against
//! the authoritative value; a mismatch rejects the whole write. Checks run
//! under the store's write lock, so the parent cannot change or disappear
//! between the check and the commit.

use super::error::{StoreError, StoreResult};
use super::state::State;
use crate::model::{
    Chunk, EditionId, MicroUnit, MicroUnitMember, MuPk, ScPk, SemanticChunk, SemanticChunkMember,
};
use tracing::warn;

/// Read access to parents and leaves as the enforcer sees them
pub(crate) trait ParentView {
    fn semantic_chunk(&self, pk: ScPk) -> Option<&SemanticChunk>;
    fn micro_unit(&self, pk: MuPk) -> Option<&MicroUnit>;
    fn chunk_by_line(&self, edition: EditionId, line_id: &str) -> Option<&Chunk>;
    fn semantic_by_sc_id(&self, edition: EditionId, sc_id: &str) -> Option<&SemanticChunk>;
}

impl ParentView for State {
    fn semantic_chunk(&self, pk: ScPk) -> Option<&SemanticChunk> {
        self.semantic_chunks.get(&pk)
    }

    fn micro_unit(&self, pk: MuPk) -> Option<&MicroUnit> {
        self.micro_units.get(&pk)
    }

    fn chunk_by_line(&self, edition: EditionId, line_id: &str) -> Option<&Chunk> {
        State::chunk_by_line(self, edition, line_id)
    }

    fn semantic_by_sc_id(&self, edition: EditionId, sc_id: &str) -> Option<&SemanticChunk> {
        State::semantic_by_sc_id(self, edition, sc_id)
    }
}

/// Committed state plus a parent created in the same change set
pub(crate) struct WithPending<'a> {
    pub base: &'a State,
    pub semantic: Option<&'a SemanticChunk>,
    pub micro: Option<&'a MicroUnit>,
}

impl ParentView for WithPending<'_> {
    fn semantic_chunk(&self, pk: ScPk) -> Option<&SemanticChunk> {
        match self.semantic {
            Some(sc) if sc.pk == pk => Some(sc),
            _ => self.base.semantic_chunks.get(&pk),
        }
    }

    fn micro_unit(&self, pk: MuPk) -> Option<&MicroUnit> {
        match self.micro {
            Some(mu) if mu.pk == pk => Some(mu),
            _ => self.base.micro_units.get(&pk),
        }
    }

    fn chunk_by_line(&self, edition: EditionId, line_id: &str) -> Option<&Chunk> {
        self.base.chunk_by_line(edition, line_id)
    }

    fn semantic_by_sc_id(&self, edition: EditionId, sc_id: &str) -> Option<&SemanticChunk> {
        match self.semantic {
            Some(sc) if sc.edition_id == edition && sc.sc_id == sc_id => Some(sc),
            _ => self.base.semantic_by_sc_id(edition, sc_id),
        }
    }
}

/// Parent-type specific half of the membership rule
pub(crate) trait MembershipValidator {
    type Member;

    /// Parent table name, reported in `Consistency` errors
    const PARENT: &'static str;
    /// Membership table name, reported in referential errors
    const MEMBER: &'static str;

    fn parent_key(member: &Self::Member) -> String;
    fn parent_edition(view: &dyn ParentView, member: &Self::Member) -> Option<EditionId>;
    fn member_edition(member: &Self::Member) -> EditionId;
    fn leaf_key(member: &Self::Member) -> String;
    fn leaf_exists(view: &dyn ParentView, member: &Self::Member) -> bool;
}

pub(crate) struct SemanticMembership;

impl MembershipValidator for SemanticMembership {
    type Member = SemanticChunkMember;

    const PARENT: &'static str = "semantic chunk";
    const MEMBER: &'static str = "semantic chunk member";

    fn parent_key(member: &SemanticChunkMember) -> String {
        format!("sc_pk={}", member.sc_pk)
    }

    fn parent_edition(view: &dyn ParentView, member: &SemanticChunkMember) -> Option<EditionId> {
        view.semantic_chunk(member.sc_pk).map(|sc| sc.edition_id)
    }

    fn member_edition(member: &SemanticChunkMember) -> EditionId {
        member.edition_id
    }

    fn leaf_key(member: &SemanticChunkMember) -> String {
        format!("chunk (edition={}, line_id={})", member.edition_id, member.line_id)
    }

    fn leaf_exists(view: &dyn ParentView, member: &SemanticChunkMember) -> bool {
        view.chunk_by_line(member.edition_id, &member.line_id).is_some()
    }
}

pub(crate) struct MicroMembership;

impl MembershipValidator for MicroMembership {
    type Member = MicroUnitMember;

    const PARENT: &'static str = "micro-unit";
    const MEMBER: &'static str = "micro-unit member";

    fn parent_key(member: &MicroUnitMember) -> String {
        format!("mu_pk={}", member.mu_pk)
    }

    fn parent_edition(view: &dyn ParentView, member: &MicroUnitMember) -> Option<EditionId> {
        view.micro_unit(member.mu_pk).map(|mu| mu.edition_id)
    }

    fn member_edition(member: &MicroUnitMember) -> EditionId {
        member.edition_id
    }

    fn leaf_key(member: &MicroUnitMember) -> String {
        format!("semantic chunk (edition={}, sc_id={})", member.edition_id, member.sc_id)
    }

    fn leaf_exists(view: &dyn ParentView, member: &MicroUnitMember) -> bool {
        view.semantic_by_sc_id(member.edition_id, &member.sc_id).is_some()
    }
}

/// Check one membership row against its parent and leaf.
///
/// Order matters: a missing parent is a referential error, an edition
/// mismatch is reported before the leaf lookup (which is keyed on the
/// member's own edition and would otherwise mask it).
pub(crate) fn enforce<V: MembershipValidator>(
    view: &dyn ParentView,
    member: &V::Member,
) -> StoreResult<()> {
    let expected = V::parent_edition(view, member)
        .ok_or_else(|| StoreError::dangling(V::MEMBER, V::parent_key(member)))?;
    let got = V::member_edition(member);
    if got != expected {
        warn!(
            parent = V::PARENT,
            key = %V::parent_key(member),
            %got,
            %expected,
            "rejected membership with mismatched edition"
        );
        return Err(StoreError::Consistency {
            parent: V::PARENT,
            got,
            expected,
        });
    }
    if !V::leaf_exists(view, member) {
        return Err(StoreError::dangling(V::MEMBER, V::leaf_key(member)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::content_hash;
    use crate::model::BoundingBox;
    use crate::store::changeset::Op;
    use chrono::Utc;

    fn state_with_parent(edition: i64) -> State {
        let now = Utc::now();
        let mut state = State::default();
        state.apply(Op::PutChunk(Chunk {
            id: crate::model::ChunkId::from_raw(1),
            edition_id: EditionId::from_raw(edition),
            line_id: "FR77".into(),
            page: 12,
            line_no: 3,
            bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap(),
            text: "Les gens ne se parlent plus.".into(),
            content_hash: content_hash("Les gens ne se parlent plus."),
        }));
        state.apply(Op::PutSemanticChunk(SemanticChunk {
            pk: ScPk::from_raw(1),
            edition_id: EditionId::from_raw(edition),
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
        state
    }

    fn member(edition: i64, line_id: &str) -> SemanticChunkMember {
        SemanticChunkMember {
            sc_pk: ScPk::from_raw(1),
            edition_id: EditionId::from_raw(edition),
            line_id: line_id.into(),
            ord: 1,
        }
    }

    #[test]
    fn accepts_matching_edition() {
        let state = state_with_parent(1);
        assert!(enforce::<SemanticMembership>(&state, &member(1, "FR77")).is_ok());
    }

    #[test]
    fn rejects_mismatched_edition_with_both_values() {
        let state = state_with_parent(1);
        let err = enforce::<SemanticMembership>(&state, &member(2, "FR77")).unwrap_err();
        match err {
            StoreError::Consistency { got, expected, .. } => {
                assert_eq!(got, EditionId::from_raw(2));
                assert_eq!(expected, EditionId::from_raw(1));
            }
            other => panic!("expected consistency violation, got {other:?}"),
        }
    }

    #[test]
    fn missing_parent_or_leaf_is_referential() {
        let state = state_with_parent(1);
        let mut orphan = member(1, "FR77");
        orphan.sc_pk = ScPk::from_raw(99);
        assert!(matches!(
            enforce::<SemanticMembership>(&state, &orphan),
            Err(StoreError::ReferentialIntegrity { .. })
        ));
        assert!(matches!(
            enforce::<SemanticMembership>(&state, &member(1, "NOPE")),
            Err(StoreError::ReferentialIntegrity { .. })
        ));
    }

    #[test]
    fn pending_parent_is_visible() {
        let state = State::default();
        let now = Utc::now();
        let unit = MicroUnit {
            pk: MuPk::from_raw(5),
            edition_id: EditionId::from_raw(3),
            unit_id: "MU_001".into(),
            page_start: None,
            page_end: None,
            summary: Default::default(),
            character_dynamics: Vec::new(),
            story_threads: Default::default(),
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };
        let view = WithPending {
            base: &state,
            semantic: None,
            micro: Some(&unit),
        };
        let wrong = MicroUnitMember {
            mu_pk: MuPk::from_raw(5),
            edition_id: EditionId::from_raw(4),
            sc_id: "SC_001".into(),
            ord: 1,
        };
        assert!(matches!(
            enforce::<MicroMembership>(&view, &wrong),
            Err(StoreError::Consistency { parent: "micro-unit", .. })
        ));
    }
}
