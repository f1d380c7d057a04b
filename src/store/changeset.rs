//! Change sets: the unit of atomic commit
//!
//! A write is planned against the current state into a [`ChangeSet`], which
//! is then persisted by the record store in one transaction and applied to
//! memory. Cascades are expanded into explicit deletes, children first.

use crate::model::{
    Chunk, ChunkId, Edition, EditionId, MicroUnit, MicroUnitMember, MuPk, ScPk, SemanticChunk,
    SemanticChunkMember, SequenceKey, Work, WorkId,
};

/// One row-level change. `Put*` inserts or replaces by primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    PutWork(Work),
    DeleteWork(WorkId),
    PutEdition(Edition),
    DeleteEdition(EditionId),
    PutChunk(Chunk),
    DeleteChunk(ChunkId),
    PutSemanticChunk(SemanticChunk),
    DeleteSemanticChunk(ScPk),
    PutSemanticMember(SemanticChunkMember),
    DeleteSemanticMember { sc_pk: ScPk, line_id: String },
    PutMicroUnit(MicroUnit),
    DeleteMicroUnit(MuPk),
    PutMicroMember(MicroUnitMember),
    DeleteMicroMember { mu_pk: MuPk, sc_id: String },
    /// Raise a key counter; emitted by record stores on load
    AdvanceSequence { key: SequenceKey, next: i64 },
}

impl Op {
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Op::DeleteWork(_)
                | Op::DeleteEdition(_)
                | Op::DeleteChunk(_)
                | Op::DeleteSemanticChunk(_)
                | Op::DeleteSemanticMember { .. }
                | Op::DeleteMicroUnit(_)
                | Op::DeleteMicroMember { .. }
        )
    }
}

/// Ordered list of row changes committed as one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    ops: Vec<Op>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of delete operations
    pub fn deletes(&self) -> usize {
        self.ops.iter().filter(|op| op.is_delete()).count()
    }
}

impl From<Vec<Op>> for ChangeSet {
    fn from(ops: Vec<Op>) -> Self {
        Self { ops }
    }
}

impl IntoIterator for ChangeSet {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
