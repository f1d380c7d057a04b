//! In-memory tables, reverse references and indices
//!
//! `State` is only mutated through [`State::apply`], which keeps every
//! secondary structure in step with the tables. Applying an op never fails:
//! all checks happen while planning the change set.

use super::changeset::{ChangeSet, Op};
use crate::index::Indexes;
use crate::model::{
    Chunk, ChunkId, Edition, EditionId, EditionKey, MicroUnit, MicroUnitMember, MuPk, ScPk,
    SemanticChunk, SemanticChunkMember, Sequences, Work, WorkId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub(crate) struct State {
    pub works: BTreeMap<WorkId, Work>,
    pub work_keys: HashMap<(String, String), WorkId>,
    pub editions: BTreeMap<EditionId, Edition>,
    pub edition_keys: HashMap<EditionKey, EditionId>,
    pub chunks: BTreeMap<ChunkId, Chunk>,
    pub semantic_chunks: BTreeMap<ScPk, SemanticChunk>,
    pub semantic_keys: BTreeMap<(EditionId, String), ScPk>,
    pub semantic_members: BTreeMap<ScPk, BTreeMap<String, SemanticChunkMember>>,
    /// `(edition, line_id)` -> semantic chunks listing that line
    pub line_refs: HashMap<(EditionId, String), BTreeSet<ScPk>>,
    pub micro_units: BTreeMap<MuPk, MicroUnit>,
    pub micro_keys: BTreeMap<(EditionId, String), MuPk>,
    pub micro_members: BTreeMap<MuPk, BTreeMap<String, MicroUnitMember>>,
    /// `(edition, sc_id)` -> micro-units listing that semantic chunk
    pub sc_refs: HashMap<(EditionId, String), BTreeSet<MuPk>>,
    pub indexes: Indexes,
    pub sequences: Sequences,
}

fn unlink<K: std::hash::Hash + Eq, V: Ord>(map: &mut HashMap<K, BTreeSet<V>>, key: &K, value: &V) {
    if let Some(set) = map.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

/// Range over an `(edition, name)` keyed map restricted to one edition
fn in_edition<V: Copy>(
    map: &BTreeMap<(EditionId, String), V>,
    edition: EditionId,
) -> impl Iterator<Item = V> + '_ {
    map.range((edition, String::new())..)
        .take_while(move |((e, _), _)| *e == edition)
        .map(|(_, v)| *v)
}

impl State {
    pub fn apply_all(&mut self, changes: ChangeSet) {
        for op in changes {
            self.apply(op);
        }
    }

    pub fn apply(&mut self, op: Op) {
        match op {
            Op::PutWork(work) => {
                Sequences::observe(&mut self.sequences.work, work.id.get());
                if let Some(old) = self.works.remove(&work.id) {
                    self.work_keys.remove(&(old.title, old.author));
                }
                self.work_keys
                    .insert((work.title.clone(), work.author.clone()), work.id);
                self.works.insert(work.id, work);
            }
            Op::DeleteWork(id) => {
                if let Some(old) = self.works.remove(&id) {
                    self.work_keys.remove(&(old.title, old.author));
                }
            }
            Op::PutEdition(edition) => {
                Sequences::observe(&mut self.sequences.edition, edition.id.get());
                if let Some(old) = self.editions.remove(&edition.id) {
                    self.edition_keys.remove(&old.identity_key());
                }
                self.edition_keys.insert(edition.identity_key(), edition.id);
                self.editions.insert(edition.id, edition);
            }
            Op::DeleteEdition(id) => {
                if let Some(old) = self.editions.remove(&id) {
                    self.edition_keys.remove(&old.identity_key());
                }
            }
            Op::PutChunk(chunk) => {
                Sequences::observe(&mut self.sequences.chunk, chunk.id.get());
                if let Some(old) = self.chunks.remove(&chunk.id) {
                    self.indexes.chunk_removed(&old);
                }
                self.indexes.chunk_added(&chunk);
                self.chunks.insert(chunk.id, chunk);
            }
            Op::DeleteChunk(id) => {
                if let Some(old) = self.chunks.remove(&id) {
                    self.indexes.chunk_removed(&old);
                }
            }
            Op::PutSemanticChunk(sc) => {
                Sequences::observe(&mut self.sequences.semantic_chunk, sc.pk.get());
                if let Some(old) = self.semantic_chunks.remove(&sc.pk) {
                    self.semantic_keys.remove(&(old.edition_id, old.sc_id));
                }
                self.semantic_keys
                    .insert((sc.edition_id, sc.sc_id.clone()), sc.pk);
                self.semantic_chunks.insert(sc.pk, sc);
            }
            Op::DeleteSemanticChunk(pk) => {
                if let Some(members) = self.semantic_members.remove(&pk) {
                    for member in members.into_values() {
                        unlink(&mut self.line_refs, &(member.edition_id, member.line_id), &pk);
                    }
                }
                if let Some(old) = self.semantic_chunks.remove(&pk) {
                    self.semantic_keys.remove(&(old.edition_id, old.sc_id));
                }
            }
            Op::PutSemanticMember(member) => {
                let members = self.semantic_members.entry(member.sc_pk).or_default();
                if let Some(old) = members.remove(&member.line_id) {
                    unlink(&mut self.line_refs, &(old.edition_id, old.line_id), &old.sc_pk);
                }
                self.line_refs
                    .entry((member.edition_id, member.line_id.clone()))
                    .or_default()
                    .insert(member.sc_pk);
                members.insert(member.line_id.clone(), member);
            }
            Op::DeleteSemanticMember { sc_pk, line_id } => {
                let removed = self
                    .semantic_members
                    .get_mut(&sc_pk)
                    .and_then(|members| members.remove(&line_id));
                if let Some(old) = removed {
                    unlink(&mut self.line_refs, &(old.edition_id, old.line_id), &sc_pk);
                }
                if self.semantic_members.get(&sc_pk).is_some_and(|m| m.is_empty()) {
                    self.semantic_members.remove(&sc_pk);
                }
            }
            Op::PutMicroUnit(unit) => {
                Sequences::observe(&mut self.sequences.micro_unit, unit.pk.get());
                if let Some(old) = self.micro_units.remove(&unit.pk) {
                    self.indexes.unit_removed(&old);
                    self.micro_keys.remove(&(old.edition_id, old.unit_id));
                }
                self.indexes.unit_added(&unit);
                self.micro_keys
                    .insert((unit.edition_id, unit.unit_id.clone()), unit.pk);
                self.micro_units.insert(unit.pk, unit);
            }
            Op::DeleteMicroUnit(pk) => {
                if let Some(members) = self.micro_members.remove(&pk) {
                    for member in members.into_values() {
                        unlink(&mut self.sc_refs, &(member.edition_id, member.sc_id), &pk);
                    }
                }
                if let Some(old) = self.micro_units.remove(&pk) {
                    self.indexes.unit_removed(&old);
                    self.micro_keys.remove(&(old.edition_id, old.unit_id));
                }
            }
            Op::PutMicroMember(member) => {
                let members = self.micro_members.entry(member.mu_pk).or_default();
                if let Some(old) = members.remove(&member.sc_id) {
                    unlink(&mut self.sc_refs, &(old.edition_id, old.sc_id), &old.mu_pk);
                }
                self.sc_refs
                    .entry((member.edition_id, member.sc_id.clone()))
                    .or_default()
                    .insert(member.mu_pk);
                members.insert(member.sc_id.clone(), member);
            }
            Op::DeleteMicroMember { mu_pk, sc_id } => {
                let removed = self
                    .micro_members
                    .get_mut(&mu_pk)
                    .and_then(|members| members.remove(&sc_id));
                if let Some(old) = removed {
                    unlink(&mut self.sc_refs, &(old.edition_id, old.sc_id), &mu_pk);
                }
                if self.micro_members.get(&mu_pk).is_some_and(|m| m.is_empty()) {
                    self.micro_members.remove(&mu_pk);
                }
            }
            Op::AdvanceSequence { key, next } => self.sequences.reserve(key, next),
        }
    }

    // === Lookups ===

    pub fn work_by_key(&self, title: &str, author: &str) -> Option<&Work> {
        self.work_keys
            .get(&(title.to_string(), author.to_string()))
            .and_then(|id| self.works.get(id))
    }

    pub fn edition_by_key(&self, key: &EditionKey) -> Option<&Edition> {
        self.edition_keys.get(key).and_then(|id| self.editions.get(id))
    }

    pub fn editions_of(&self, work_id: WorkId) -> impl Iterator<Item = &Edition> + '_ {
        self.editions.values().filter(move |e| e.work_id == work_id)
    }

    pub fn chunk_by_line(&self, edition: EditionId, line_id: &str) -> Option<&Chunk> {
        self.indexes
            .positional
            .by_line_id(edition, line_id)
            .and_then(|id| self.chunks.get(&id))
    }

    pub fn chunk_at(&self, edition: EditionId, page: u32, line_no: u32) -> Option<&Chunk> {
        self.indexes
            .positional
            .at(edition, page, line_no)
            .and_then(|id| self.chunks.get(&id))
    }

    pub fn semantic_by_sc_id(&self, edition: EditionId, sc_id: &str) -> Option<&SemanticChunk> {
        self.semantic_keys
            .get(&(edition, sc_id.to_string()))
            .and_then(|pk| self.semantic_chunks.get(pk))
    }

    pub fn micro_by_unit_id(&self, edition: EditionId, unit_id: &str) -> Option<&MicroUnit> {
        self.micro_keys
            .get(&(edition, unit_id.to_string()))
            .and_then(|pk| self.micro_units.get(pk))
    }

    pub fn semantic_in_edition(&self, edition: EditionId) -> impl Iterator<Item = ScPk> + '_ {
        in_edition(&self.semantic_keys, edition)
    }

    pub fn micro_in_edition(&self, edition: EditionId) -> impl Iterator<Item = MuPk> + '_ {
        in_edition(&self.micro_keys, edition)
    }

    /// Members of a semantic chunk in `ord` order, ties broken by `line_id`
    pub fn semantic_members_of(&self, pk: ScPk) -> Vec<&SemanticChunkMember> {
        let mut members: Vec<_> = self
            .semantic_members
            .get(&pk)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        // Values come out sorted by line_id, so a stable sort on ord keeps ties ordered
        members.sort_by_key(|m| m.ord);
        members
    }

    /// Members of a micro-unit in `ord` order, ties broken by `sc_id`
    pub fn micro_members_of(&self, pk: MuPk) -> Vec<&MicroUnitMember> {
        let mut members: Vec<_> = self
            .micro_members
            .get(&pk)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        members.sort_by_key(|m| m.ord);
        members
    }

    pub fn semantic_member(&self, sc_pk: ScPk, line_id: &str) -> Option<&SemanticChunkMember> {
        self.semantic_members.get(&sc_pk).and_then(|m| m.get(line_id))
    }

    pub fn micro_member(&self, mu_pk: MuPk, sc_id: &str) -> Option<&MicroUnitMember> {
        self.micro_members.get(&mu_pk).and_then(|m| m.get(sc_id))
    }
}
