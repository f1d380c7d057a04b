//! Palimpsest: the main entry point for the text store
//!
//! Writes are serialized behind one lock. Each write is planned against the
//! current state into a [`ChangeSet`] (validation, derived fields, membership
//! enforcement, cascade expansion), persisted by the record store in a single
//! transaction, and only then applied to memory together with the indices.
//! If any step fails, nothing is applied.
//!
//! Committed state is published as an `Arc<State>`. Readers clone the
//! pointer and never hold a lock afterwards; a write copies the state only
//! while some snapshot still shares it.

use super::cascade::Cascade;
use super::changeset::{ChangeSet, Op};
use super::consistency::{enforce, MicroMembership, SemanticMembership, WithPending};
use super::error::{StoreError, StoreResult};
use super::snapshot::Snapshot;
use super::state::State;
use super::validate;
use crate::config::{StoreConfig, StoreLocation};
use crate::derive::{content_hash, touch, Clock, SystemClock};
use crate::model::{
    BoundingBox, Chunk, ChunkId, Edition, EditionId, MicroUnit, MicroUnitMember, MicroUnitPatch,
    MuPk, NewChunk, NewEdition, NewMicroUnit, NewSemanticChunk, ScPk, SemanticChunk,
    SemanticChunkMember, SemanticChunkPatch, Work, WorkId,
};
use crate::storage::{OpenStore, RecordStore, SqliteStore, StorageError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

/// The text store
pub struct Palimpsest {
    /// Latest committed state; locked only to read or swap the pointer
    current: RwLock<Arc<State>>,
    /// Serializes writers from planning through apply
    writer: Mutex<()>,
    store: Option<Arc<dyn RecordStore>>,
    clock: Arc<dyn Clock>,
}

impl Default for Palimpsest {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Palimpsest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Palimpsest")
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl Palimpsest {
    /// Create an empty, memory-only store using the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty, memory-only store with an injected clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(Arc::new(State::default())),
            writer: Mutex::new(()),
            store: None,
            clock,
        }
    }

    /// Create a store backed by durable storage, loading everything it holds.
    ///
    /// The loaded data is audited before use; a store whose rows break the
    /// membership or content-hash invariants is refused.
    pub fn with_store(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let mut state = State::default();
        let loaded = store.load()?;
        let rows = loaded.len();
        state.apply_all(loaded);

        let issues = super::snapshot::audit(&state);
        if let Some(first) = issues.first() {
            return Err(StorageError::Corrupt(format!(
                "{} integrity issue(s) in stored data, first: {first}",
                issues.len()
            ))
            .into());
        }
        info!(rows, "loaded text store");

        Ok(Self {
            current: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            store: Some(store),
            clock,
        })
    }

    /// Open the store described by `config`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = match &config.location {
            StoreLocation::InMemory => SqliteStore::open_in_memory()?,
            StoreLocation::File(path) => SqliteStore::open(path)?,
        };
        Self::with_store(Arc::new(store), clock)
    }

    /// Consistent read view of the latest committed state.
    ///
    /// Holds no lock: writes committed after this call are not visible
    /// through it and are never blocked by it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.published())
    }

    fn published(&self) -> Arc<State> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plan, persist, then apply one atomic write
    fn commit<T>(
        &self,
        operation: &'static str,
        plan: impl FnOnce(&State) -> StoreResult<(ChangeSet, T)>,
    ) -> StoreResult<T> {
        let _writer = self.lock_writer();
        let (changes, out) = {
            let base = self.published();
            plan(&*base)?
        };
        if changes.is_empty() {
            return Ok(out);
        }
        if let Some(store) = &self.store {
            store.commit(&changes)?;
        }
        debug!(
            operation,
            ops = changes.len(),
            deletes = changes.deletes(),
            "committed change set"
        );
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        // Copies only if a snapshot still shares the old state
        Arc::make_mut(&mut current).apply_all(changes);
        Ok(out)
    }

    // === Works & editions ===

    /// Return the work with this `(title, author)`, creating it if needed.
    ///
    /// An existing work is returned unchanged; `notes` only apply on creation.
    pub fn ensure_work(&self, title: &str, author: &str, notes: Option<&str>) -> StoreResult<WorkId> {
        validate::non_empty("title", title)?;
        validate::non_empty("author", author)?;
        self.commit("ensure_work", |state| {
            if let Some(existing) = state.work_by_key(title, author) {
                return Ok((ChangeSet::new(), existing.id));
            }
            let work = Work {
                id: WorkId::from_raw(state.sequences.work),
                title: title.to_string(),
                author: author.to_string(),
                notes: notes.map(str::to_string),
            };
            let id = work.id;
            Ok((vec![Op::PutWork(work)].into(), id))
        })
    }

    pub fn update_work_notes(&self, id: WorkId, notes: Option<String>) -> StoreResult<()> {
        self.commit("update_work_notes", |state| {
            let mut work = state
                .works
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("work", id))?;
            work.notes = notes;
            Ok((vec![Op::PutWork(work)].into(), ()))
        })
    }

    /// Delete a work that no edition references
    pub fn delete_work(&self, id: WorkId) -> StoreResult<()> {
        self.commit("delete_work", |state| {
            if !state.works.contains_key(&id) {
                return Err(StoreError::not_found("work", id));
            }
            if let Some(edition) = state.editions_of(id).next() {
                return Err(StoreError::dangling(
                    "edition",
                    format!("edition {} still references work {id}", edition.id),
                ));
            }
            Ok((vec![Op::DeleteWork(id)].into(), ()))
        })
    }

    /// Return the edition with this identity key, creating it if needed.
    ///
    /// The identity key is `(work_id, language, publisher, source_archive_id)`;
    /// an existing edition is returned unchanged.
    pub fn ensure_edition(&self, work_id: WorkId, new: NewEdition) -> StoreResult<EditionId> {
        let language = validate::language(&new.language)?;
        validate::year(new.year)?;
        self.commit("ensure_edition", |state| {
            if !state.works.contains_key(&work_id) {
                return Err(StoreError::dangling("edition", format!("work {work_id}")));
            }
            let key = (
                work_id,
                language.clone(),
                new.publisher.clone(),
                new.source_archive_id.clone(),
            );
            if let Some(existing) = state.edition_by_key(&key) {
                return Ok((ChangeSet::new(), existing.id));
            }
            let edition = Edition {
                id: EditionId::from_raw(state.sequences.edition),
                work_id,
                language,
                publisher: new.publisher,
                year: new.year,
                isbn: new.isbn,
                source_archive_id: new.source_archive_id,
                notes: new.notes,
            };
            let id = edition.id;
            Ok((vec![Op::PutEdition(edition)].into(), id))
        })
    }

    pub fn update_edition_notes(&self, id: EditionId, notes: Option<String>) -> StoreResult<()> {
        self.commit("update_edition_notes", |state| {
            let mut edition = state
                .editions
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("edition", id))?;
            edition.notes = notes;
            Ok((vec![Op::PutEdition(edition)].into(), ()))
        })
    }

    /// Delete an edition with all its chunks, semantic chunks, micro-units
    /// and memberships, as one unit
    pub fn delete_edition(&self, id: EditionId) -> StoreResult<()> {
        self.commit("delete_edition", |state| {
            let mut cascade = Cascade::new(state);
            cascade.edition(id)?;
            Ok((cascade.finish(), ()))
        })
    }

    // === Chunks ===

    /// Insert one OCR line. Fails on a duplicate position or line id.
    pub fn insert_chunk(&self, edition_id: EditionId, new: NewChunk) -> StoreResult<ChunkId> {
        validate::non_empty("line_id", &new.line_id)?;
        validate::positive("page", new.page)?;
        validate::positive("line_no", new.line_no)?;
        let bounding_box = BoundingBox::from_slice(&new.bounding_box)?;

        self.commit("insert_chunk", |state| {
            if !state.editions.contains_key(&edition_id) {
                return Err(StoreError::dangling("chunk", format!("edition {edition_id}")));
            }
            if state.chunk_at(edition_id, new.page, new.line_no).is_some() {
                return Err(StoreError::duplicate(
                    "chunk position",
                    format!("(edition={edition_id}, page={}, line_no={})", new.page, new.line_no),
                ));
            }
            if state.chunk_by_line(edition_id, &new.line_id).is_some() {
                return Err(StoreError::duplicate(
                    "chunk line_id",
                    format!("(edition={edition_id}, line_id={})", new.line_id),
                ));
            }
            let chunk = Chunk {
                id: ChunkId::from_raw(state.sequences.chunk),
                edition_id,
                content_hash: content_hash(&new.text),
                line_id: new.line_id,
                page: new.page,
                line_no: new.line_no,
                bounding_box,
                text: new.text,
            };
            let id = chunk.id;
            Ok((vec![Op::PutChunk(chunk)].into(), id))
        })
    }

    /// Delete a chunk and every semantic membership pointing at it
    pub fn delete_chunk(&self, id: ChunkId) -> StoreResult<()> {
        self.commit("delete_chunk", |state| {
            let mut cascade = Cascade::new(state);
            cascade.chunk(id)?;
            Ok((cascade.finish(), ()))
        })
    }

    // === Semantic chunks ===

    fn build_semantic_chunk(
        &self,
        state: &State,
        edition_id: EditionId,
        new: NewSemanticChunk,
    ) -> StoreResult<SemanticChunk> {
        validate::non_empty("sc_id", &new.sc_id)?;
        validate::page_span(new.pages)?;
        if !state.editions.contains_key(&edition_id) {
            return Err(StoreError::dangling("semantic chunk", format!("edition {edition_id}")));
        }
        if state.semantic_by_sc_id(edition_id, &new.sc_id).is_some() {
            return Err(StoreError::duplicate(
                "semantic chunk",
                format!("(edition={edition_id}, sc_id={})", new.sc_id),
            ));
        }
        let now = self.clock.now();
        let mut sc = SemanticChunk {
            pk: ScPk::from_raw(state.sequences.semantic_chunk),
            edition_id,
            sc_id: new.sc_id,
            page_start: new.pages.start,
            page_end: new.pages.end,
            embedding_text: None,
            embedding_summary: None,
            paraphrase: None,
            word_count: new.word_count,
            sentence_count: new.sentence_count,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };
        sc.set_text_variants(new.text);
        Ok(sc)
    }

    /// Create a semantic chunk without members
    pub fn create_semantic_chunk(&self, edition_id: EditionId, new: NewSemanticChunk) -> StoreResult<ScPk> {
        self.commit("create_semantic_chunk", |state| {
            let sc = self.build_semantic_chunk(state, edition_id, new)?;
            let pk = sc.pk;
            Ok((vec![Op::PutSemanticChunk(sc)].into(), pk))
        })
    }

    /// Create a semantic chunk with its members in one unit.
    ///
    /// `line_ids` are in reading order and receive `ord` 1, 2, 3, ...
    pub fn assemble_semantic_chunk<S: AsRef<str>>(
        &self,
        edition_id: EditionId,
        new: NewSemanticChunk,
        line_ids: &[S],
    ) -> StoreResult<ScPk> {
        self.commit("assemble_semantic_chunk", |state| {
            let sc = self.build_semantic_chunk(state, edition_id, new)?;
            let members = line_ids
                .iter()
                .enumerate()
                .map(|(i, line_id)| SemanticChunkMember {
                    sc_pk: sc.pk,
                    edition_id,
                    line_id: line_id.as_ref().to_string(),
                    ord: i as u32 + 1,
                })
                .collect::<Vec<_>>();

            let view = WithPending {
                base: state,
                semantic: Some(&sc),
                micro: None,
            };
            let mut seen = HashSet::new();
            for member in &members {
                validate::non_empty("line_id", &member.line_id)?;
                if !seen.insert(member.line_id.as_str()) {
                    return Err(StoreError::duplicate(
                        "semantic chunk member",
                        format!("(sc_id={}, line_id={})", sc.sc_id, member.line_id),
                    ));
                }
                enforce::<SemanticMembership>(&view, member)?;
            }

            let pk = sc.pk;
            let mut changes = ChangeSet::new();
            changes.push(Op::PutSemanticChunk(sc));
            for member in members {
                changes.push(Op::PutSemanticMember(member));
            }
            Ok((changes, pk))
        })
    }

    /// Change fields of a semantic chunk and bump `updated_at`. An empty
    /// patch only checks that the chunk exists.
    pub fn update_semantic_chunk(&self, pk: ScPk, patch: SemanticChunkPatch) -> StoreResult<()> {
        self.commit("update_semantic_chunk", |state| {
            let mut sc = state
                .semantic_chunks
                .get(&pk)
                .cloned()
                .ok_or_else(|| StoreError::not_found("semantic chunk", pk))?;
            // Nothing to change, nothing to touch
            if patch.is_empty() {
                return Ok((ChangeSet::new(), ()));
            }
            if let Some(pages) = patch.pages {
                validate::page_span(pages)?;
                sc.page_start = pages.start;
                sc.page_end = pages.end;
            }
            if let Some(text) = patch.text {
                sc.set_text_variants(text);
            }
            if let Some(words) = patch.word_count {
                sc.word_count = Some(words);
            }
            if let Some(sentences) = patch.sentence_count {
                sc.sentence_count = Some(sentences);
            }
            if let Some(metadata) = patch.metadata {
                sc.metadata = metadata;
            }
            touch(&mut sc, self.clock.as_ref());
            Ok((vec![Op::PutSemanticChunk(sc)].into(), ()))
        })
    }

    /// Delete a semantic chunk, its members, and micro-unit memberships
    /// that reference it
    pub fn delete_semantic_chunk(&self, pk: ScPk) -> StoreResult<()> {
        self.commit("delete_semantic_chunk", |state| {
            let mut cascade = Cascade::new(state);
            cascade.semantic_chunk(pk)?;
            Ok((cascade.finish(), ()))
        })
    }

    /// Add one line to a semantic chunk
    pub fn add_semantic_member(&self, member: SemanticChunkMember) -> StoreResult<()> {
        validate::positive("ord", member.ord)?;
        validate::non_empty("line_id", &member.line_id)?;
        self.commit("add_semantic_member", |state| {
            enforce::<SemanticMembership>(state, &member)?;
            if state.semantic_member(member.sc_pk, &member.line_id).is_some() {
                return Err(StoreError::duplicate(
                    "semantic chunk member",
                    format!("(sc_pk={}, line_id={})", member.sc_pk, member.line_id),
                ));
            }
            Ok((vec![Op::PutSemanticMember(member)].into(), ()))
        })
    }

    /// Replace an existing membership row (typically to change `ord`)
    pub fn update_semantic_member(&self, member: SemanticChunkMember) -> StoreResult<()> {
        validate::positive("ord", member.ord)?;
        self.commit("update_semantic_member", |state| {
            enforce::<SemanticMembership>(state, &member)?;
            if state.semantic_member(member.sc_pk, &member.line_id).is_none() {
                return Err(StoreError::not_found(
                    "semantic chunk member",
                    format!("(sc_pk={}, line_id={})", member.sc_pk, member.line_id),
                ));
            }
            Ok((vec![Op::PutSemanticMember(member)].into(), ()))
        })
    }

    pub fn delete_semantic_member(&self, sc_pk: ScPk, line_id: &str) -> StoreResult<()> {
        self.commit("delete_semantic_member", |state| {
            let mut cascade = Cascade::new(state);
            cascade.semantic_member(sc_pk, line_id)?;
            Ok((cascade.finish(), ()))
        })
    }

    // === Micro-units ===

    fn build_micro_unit(
        &self,
        state: &State,
        edition_id: EditionId,
        new: NewMicroUnit,
    ) -> StoreResult<MicroUnit> {
        validate::non_empty("unit_id", &new.unit_id)?;
        validate::page_span(new.pages)?;
        validate::character_dynamics(&new.character_dynamics)?;
        let story_threads = validate::story_threads(new.story_threads)?;
        if !state.editions.contains_key(&edition_id) {
            return Err(StoreError::dangling("micro-unit", format!("edition {edition_id}")));
        }
        if state.micro_by_unit_id(edition_id, &new.unit_id).is_some() {
            return Err(StoreError::duplicate(
                "micro-unit",
                format!("(edition={edition_id}, unit_id={})", new.unit_id),
            ));
        }
        let now = self.clock.now();
        Ok(MicroUnit {
            pk: MuPk::from_raw(state.sequences.micro_unit),
            edition_id,
            unit_id: new.unit_id,
            page_start: new.pages.start,
            page_end: new.pages.end,
            summary: new.summary,
            character_dynamics: new.character_dynamics,
            story_threads,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a micro-unit without members
    pub fn create_micro_unit(&self, edition_id: EditionId, new: NewMicroUnit) -> StoreResult<MuPk> {
        self.commit("create_micro_unit", |state| {
            let unit = self.build_micro_unit(state, edition_id, new)?;
            let pk = unit.pk;
            Ok((vec![Op::PutMicroUnit(unit)].into(), pk))
        })
    }

    /// Create a micro-unit with its members in one unit.
    ///
    /// `sc_ids` are in narrative order and receive `ord` 1, 2, 3, ...
    pub fn assemble_micro_unit<S: AsRef<str>>(
        &self,
        edition_id: EditionId,
        new: NewMicroUnit,
        sc_ids: &[S],
    ) -> StoreResult<MuPk> {
        self.commit("assemble_micro_unit", |state| {
            let unit = self.build_micro_unit(state, edition_id, new)?;
            let members = sc_ids
                .iter()
                .enumerate()
                .map(|(i, sc_id)| MicroUnitMember {
                    mu_pk: unit.pk,
                    edition_id,
                    sc_id: sc_id.as_ref().to_string(),
                    ord: i as u32 + 1,
                })
                .collect::<Vec<_>>();

            let view = WithPending {
                base: state,
                semantic: None,
                micro: Some(&unit),
            };
            let mut seen = HashSet::new();
            for member in &members {
                validate::non_empty("sc_id", &member.sc_id)?;
                if !seen.insert(member.sc_id.as_str()) {
                    return Err(StoreError::duplicate(
                        "micro-unit member",
                        format!("(unit_id={}, sc_id={})", unit.unit_id, member.sc_id),
                    ));
                }
                enforce::<MicroMembership>(&view, member)?;
            }

            let pk = unit.pk;
            let mut changes = ChangeSet::new();
            changes.push(Op::PutMicroUnit(unit));
            for member in members {
                changes.push(Op::PutMicroMember(member));
            }
            Ok((changes, pk))
        })
    }

    /// Change fields of a micro-unit, re-index it and bump `updated_at`
    pub fn update_micro_unit(&self, pk: MuPk, patch: MicroUnitPatch) -> StoreResult<()> {
        self.commit("update_micro_unit", |state| {
            let mut unit = state
                .micro_units
                .get(&pk)
                .cloned()
                .ok_or_else(|| StoreError::not_found("micro-unit", pk))?;
            if patch.is_empty() {
                return Ok((ChangeSet::new(), ()));
            }
            if let Some(pages) = patch.pages {
                validate::page_span(pages)?;
                unit.page_start = pages.start;
                unit.page_end = pages.end;
            }
            if let Some(summary) = patch.summary {
                unit.summary = summary;
            }
            if let Some(dynamics) = patch.character_dynamics {
                validate::character_dynamics(&dynamics)?;
                unit.character_dynamics = dynamics;
            }
            if let Some(threads) = patch.story_threads {
                unit.story_threads = validate::story_threads(threads)?;
            }
            if let Some(metadata) = patch.metadata {
                unit.metadata = metadata;
            }
            touch(&mut unit, self.clock.as_ref());
            Ok((vec![Op::PutMicroUnit(unit)].into(), ()))
        })
    }

    /// Delete a micro-unit and its members
    pub fn delete_micro_unit(&self, pk: MuPk) -> StoreResult<()> {
        self.commit("delete_micro_unit", |state| {
            let mut cascade = Cascade::new(state);
            cascade.micro_unit(pk)?;
            Ok((cascade.finish(), ()))
        })
    }

    /// Add one semantic chunk to a micro-unit
    pub fn add_micro_member(&self, member: MicroUnitMember) -> StoreResult<()> {
        validate::positive("ord", member.ord)?;
        validate::non_empty("sc_id", &member.sc_id)?;
        self.commit("add_micro_member", |state| {
            enforce::<MicroMembership>(state, &member)?;
            if state.micro_member(member.mu_pk, &member.sc_id).is_some() {
                return Err(StoreError::duplicate(
                    "micro-unit member",
                    format!("(mu_pk={}, sc_id={})", member.mu_pk, member.sc_id),
                ));
            }
            Ok((vec![Op::PutMicroMember(member)].into(), ()))
        })
    }

    /// Replace an existing membership row (typically to change `ord`)
    pub fn update_micro_member(&self, member: MicroUnitMember) -> StoreResult<()> {
        validate::positive("ord", member.ord)?;
        self.commit("update_micro_member", |state| {
            enforce::<MicroMembership>(state, &member)?;
            if state.micro_member(member.mu_pk, &member.sc_id).is_none() {
                return Err(StoreError::not_found(
                    "micro-unit member",
                    format!("(mu_pk={}, sc_id={})", member.mu_pk, member.sc_id),
                ));
            }
            Ok((vec![Op::PutMicroMember(member)].into(), ()))
        })
    }

    pub fn delete_micro_member(&self, mu_pk: MuPk, sc_id: &str) -> StoreResult<()> {
        self.commit("delete_micro_member", |state| {
            let mut cascade = Cascade::new(state);
            cascade.micro_member(mu_pk, sc_id)?;
            Ok((cascade.finish(), ()))
        })
    }
}
