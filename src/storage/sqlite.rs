//! SQLite storage backend

use super::traits::{OpenStore, RecordStore, StorageError, StorageResult};
use crate::derive::{content_hash, ContentHash};
use crate::model::{
    BoundingBox, Chunk, ChunkId, Edition, EditionId, MicroUnit, MicroUnitMember, MuPk, ScPk,
    SemanticChunk, SemanticChunkMember, SequenceKey, Work, WorkId,
};
use crate::store::{ChangeSet, Op};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-backed record store
///
/// One table per record type. Uniqueness keys are `UNIQUE` constraints and
/// references are plain foreign keys without cascade; the engine plans
/// cascades itself and deletes children first. Thread-safe via internal
/// mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| StorageError::DateParse(e.to_string()))?
        .with_timezone(&Utc))
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS works (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                notes TEXT,
                UNIQUE (title, author)
            );

            CREATE TABLE IF NOT EXISTS editions (
                id INTEGER PRIMARY KEY,
                work_id INTEGER NOT NULL REFERENCES works(id),
                language TEXT NOT NULL,
                publisher TEXT,
                year INTEGER,
                isbn TEXT,
                source_archive_id TEXT,
                notes TEXT,
                UNIQUE (work_id, language, publisher, source_archive_id)
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY,
                edition_id INTEGER NOT NULL REFERENCES editions(id),
                line_id TEXT NOT NULL,
                page INTEGER NOT NULL CHECK (page > 0),
                line_no INTEGER NOT NULL CHECK (line_no > 0),
                bounding_box_json TEXT NOT NULL,
                text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                UNIQUE (edition_id, page, line_no),
                UNIQUE (edition_id, line_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_hash ON chunks(content_hash);

            CREATE TABLE IF NOT EXISTS semantic_chunks (
                id INTEGER PRIMARY KEY,
                edition_id INTEGER NOT NULL REFERENCES editions(id),
                sc_id TEXT NOT NULL,
                page_start INTEGER,
                page_end INTEGER,
                embedding_text TEXT,
                embedding_summary TEXT,
                paraphrase TEXT,
                word_count INTEGER,
                sentence_count INTEGER,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (edition_id, sc_id)
            );

            CREATE TABLE IF NOT EXISTS semantic_chunk_members (
                sc_pk INTEGER NOT NULL REFERENCES semantic_chunks(id),
                edition_id INTEGER NOT NULL,
                line_id TEXT NOT NULL,
                ord INTEGER NOT NULL CHECK (ord > 0),
                PRIMARY KEY (sc_pk, line_id),
                FOREIGN KEY (edition_id, line_id) REFERENCES chunks(edition_id, line_id)
            );

            CREATE TABLE IF NOT EXISTS micro_units (
                id INTEGER PRIMARY KEY,
                edition_id INTEGER NOT NULL REFERENCES editions(id),
                unit_id TEXT NOT NULL,
                page_start INTEGER,
                page_end INTEGER,
                summary_json TEXT NOT NULL,
                character_dynamics_json TEXT NOT NULL,
                story_threads_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (edition_id, unit_id)
            );

            CREATE TABLE IF NOT EXISTS micro_unit_members (
                mu_pk INTEGER NOT NULL REFERENCES micro_units(id),
                edition_id INTEGER NOT NULL,
                sc_id TEXT NOT NULL,
                ord INTEGER NOT NULL CHECK (ord > 0),
                PRIMARY KEY (mu_pk, sc_id),
                FOREIGN KEY (edition_id, sc_id) REFERENCES semantic_chunks(edition_id, sc_id)
            );

            CREATE TABLE IF NOT EXISTS sequences (
                name TEXT PRIMARY KEY,
                next INTEGER NOT NULL CHECK (next > 0)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise a persisted key counter; never lowers it
    fn advance_sequence(conn: &Connection, key: SequenceKey, next: i64) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO sequences (name, next) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET next = MAX(next, excluded.next)
            "#,
            params![key.as_str(), next],
        )?;
        Ok(())
    }

    fn write_op(conn: &Connection, op: &Op) -> StorageResult<()> {
        // Keys are claimed in the same transaction as the row that uses them
        let claimed = match op {
            Op::PutWork(work) => Some((SequenceKey::Work, work.id.get())),
            Op::PutEdition(edition) => Some((SequenceKey::Edition, edition.id.get())),
            Op::PutChunk(chunk) => Some((SequenceKey::Chunk, chunk.id.get())),
            Op::PutSemanticChunk(sc) => Some((SequenceKey::SemanticChunk, sc.pk.get())),
            Op::PutMicroUnit(unit) => Some((SequenceKey::MicroUnit, unit.pk.get())),
            _ => None,
        };
        if let Some((key, raw)) = claimed {
            Self::advance_sequence(conn, key, raw + 1)?;
        }

        match op {
            Op::PutWork(work) => {
                conn.execute(
                    r#"
                    INSERT INTO works (id, title, author, notes)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        author = excluded.author,
                        notes = excluded.notes
                    "#,
                    params![work.id.get(), work.title, work.author, work.notes],
                )?;
            }
            Op::DeleteWork(id) => {
                conn.execute("DELETE FROM works WHERE id = ?1", params![id.get()])?;
            }
            Op::PutEdition(edition) => {
                conn.execute(
                    r#"
                    INSERT INTO editions (id, work_id, language, publisher, year, isbn, source_archive_id, notes)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(id) DO UPDATE SET
                        language = excluded.language,
                        publisher = excluded.publisher,
                        year = excluded.year,
                        isbn = excluded.isbn,
                        source_archive_id = excluded.source_archive_id,
                        notes = excluded.notes
                    "#,
                    params![
                        edition.id.get(),
                        edition.work_id.get(),
                        edition.language,
                        edition.publisher,
                        edition.year,
                        edition.isbn,
                        edition.source_archive_id,
                        edition.notes,
                    ],
                )?;
            }
            Op::DeleteEdition(id) => {
                conn.execute("DELETE FROM editions WHERE id = ?1", params![id.get()])?;
            }
            Op::PutChunk(chunk) => {
                conn.execute(
                    r#"
                    INSERT INTO chunks (id, edition_id, line_id, page, line_no, bounding_box_json, text, content_hash)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(id) DO UPDATE SET
                        bounding_box_json = excluded.bounding_box_json,
                        text = excluded.text,
                        content_hash = excluded.content_hash
                    "#,
                    params![
                        chunk.id.get(),
                        chunk.edition_id.get(),
                        chunk.line_id,
                        chunk.page,
                        chunk.line_no,
                        serde_json::to_string(&chunk.bounding_box)?,
                        chunk.text,
                        chunk.content_hash.as_str(),
                    ],
                )?;
            }
            Op::DeleteChunk(id) => {
                conn.execute("DELETE FROM chunks WHERE id = ?1", params![id.get()])?;
            }
            Op::PutSemanticChunk(sc) => {
                conn.execute(
                    r#"
                    INSERT INTO semantic_chunks (id, edition_id, sc_id, page_start, page_end,
                                                 embedding_text, embedding_summary, paraphrase,
                                                 word_count, sentence_count, metadata_json,
                                                 created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    ON CONFLICT(id) DO UPDATE SET
                        page_start = excluded.page_start,
                        page_end = excluded.page_end,
                        embedding_text = excluded.embedding_text,
                        embedding_summary = excluded.embedding_summary,
                        paraphrase = excluded.paraphrase,
                        word_count = excluded.word_count,
                        sentence_count = excluded.sentence_count,
                        metadata_json = excluded.metadata_json,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        sc.pk.get(),
                        sc.edition_id.get(),
                        sc.sc_id,
                        sc.page_start,
                        sc.page_end,
                        sc.embedding_text,
                        sc.embedding_summary,
                        sc.paraphrase,
                        sc.word_count,
                        sc.sentence_count,
                        serde_json::to_string(&sc.metadata)?,
                        sc.created_at.to_rfc3339(),
                        sc.updated_at.to_rfc3339(),
                    ],
                )?;
            }
            Op::DeleteSemanticChunk(pk) => {
                conn.execute("DELETE FROM semantic_chunks WHERE id = ?1", params![pk.get()])?;
            }
            Op::PutSemanticMember(member) => {
                conn.execute(
                    r#"
                    INSERT INTO semantic_chunk_members (sc_pk, edition_id, line_id, ord)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(sc_pk, line_id) DO UPDATE SET
                        edition_id = excluded.edition_id,
                        ord = excluded.ord
                    "#,
                    params![
                        member.sc_pk.get(),
                        member.edition_id.get(),
                        member.line_id,
                        member.ord
                    ],
                )?;
            }
            Op::DeleteSemanticMember { sc_pk, line_id } => {
                conn.execute(
                    "DELETE FROM semantic_chunk_members WHERE sc_pk = ?1 AND line_id = ?2",
                    params![sc_pk.get(), line_id],
                )?;
            }
            Op::PutMicroUnit(unit) => {
                conn.execute(
                    r#"
                    INSERT INTO micro_units (id, edition_id, unit_id, page_start, page_end,
                                             summary_json, character_dynamics_json,
                                             story_threads_json, metadata_json,
                                             created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(id) DO UPDATE SET
                        page_start = excluded.page_start,
                        page_end = excluded.page_end,
                        summary_json = excluded.summary_json,
                        character_dynamics_json = excluded.character_dynamics_json,
                        story_threads_json = excluded.story_threads_json,
                        metadata_json = excluded.metadata_json,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        unit.pk.get(),
                        unit.edition_id.get(),
                        unit.unit_id,
                        unit.page_start,
                        unit.page_end,
                        serde_json::to_string(&unit.summary)?,
                        serde_json::to_string(&unit.character_dynamics)?,
                        serde_json::to_string(&unit.story_threads)?,
                        serde_json::to_string(&unit.metadata)?,
                        unit.created_at.to_rfc3339(),
                        unit.updated_at.to_rfc3339(),
                    ],
                )?;
            }
            Op::DeleteMicroUnit(pk) => {
                conn.execute("DELETE FROM micro_units WHERE id = ?1", params![pk.get()])?;
            }
            Op::PutMicroMember(member) => {
                conn.execute(
                    r#"
                    INSERT INTO micro_unit_members (mu_pk, edition_id, sc_id, ord)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(mu_pk, sc_id) DO UPDATE SET
                        edition_id = excluded.edition_id,
                        ord = excluded.ord
                    "#,
                    params![
                        member.mu_pk.get(),
                        member.edition_id.get(),
                        member.sc_id,
                        member.ord
                    ],
                )?;
            }
            Op::DeleteMicroMember { mu_pk, sc_id } => {
                conn.execute(
                    "DELETE FROM micro_unit_members WHERE mu_pk = ?1 AND sc_id = ?2",
                    params![mu_pk.get(), sc_id],
                )?;
            }
            Op::AdvanceSequence { key, next } => Self::advance_sequence(conn, *key, *next)?,
        }
        Ok(())
    }

    fn load_sequences(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare("SELECT name, next FROM sequences ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (name, next) = row?;
            let key = SequenceKey::from_name(&name)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown key sequence `{name}`")))?;
            out.push(Op::AdvanceSequence { key, next });
        }
        Ok(())
    }

    fn load_works(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare("SELECT id, title, author, notes FROM works ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Work {
                id: WorkId::from_raw(row.get(0)?),
                title: row.get(1)?,
                author: row.get(2)?,
                notes: row.get(3)?,
            })
        })?;
        for work in rows {
            out.push(Op::PutWork(work?));
        }
        Ok(())
    }

    fn load_editions(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT id, work_id, language, publisher, year, isbn, source_archive_id, notes
             FROM editions ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Edition {
                id: EditionId::from_raw(row.get(0)?),
                work_id: WorkId::from_raw(row.get(1)?),
                language: row.get(2)?,
                publisher: row.get(3)?,
                year: row.get(4)?,
                isbn: row.get(5)?,
                source_archive_id: row.get(6)?,
                notes: row.get(7)?,
            })
        })?;
        for edition in rows {
            out.push(Op::PutEdition(edition?));
        }
        Ok(())
    }

    /// Chunks are re-hashed on the way in; a stored hash that disagrees with
    /// the text means the row was altered outside the engine.
    fn load_chunks(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT id, edition_id, line_id, page, line_no, bounding_box_json, text, content_hash
             FROM chunks ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        for row in rows {
            let (id, edition_id, line_id, page, line_no, bbox, text, stored_hash) = row?;
            let hash = content_hash(&text);
            if hash != ContentHash::from_hex(stored_hash) {
                return Err(StorageError::Corrupt(format!(
                    "chunk {id} content hash does not match its text"
                )));
            }
            let bounding_box: BoundingBox = serde_json::from_str(&bbox)?;
            out.push(Op::PutChunk(Chunk {
                id: ChunkId::from_raw(id),
                edition_id: EditionId::from_raw(edition_id),
                line_id,
                page,
                line_no,
                bounding_box,
                text,
                content_hash: hash,
            }));
        }
        Ok(())
    }

    fn load_semantic_chunks(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT id, edition_id, sc_id, page_start, page_end, embedding_text, embedding_summary,
                    paraphrase, word_count, sentence_count, metadata_json, created_at, updated_at
             FROM semantic_chunks ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<u32>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<u32>>(8)?,
                row.get::<_, Option<u32>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;
        for row in rows {
            let (
                pk,
                edition_id,
                sc_id,
                page_start,
                page_end,
                embedding_text,
                embedding_summary,
                paraphrase,
                word_count,
                sentence_count,
                metadata,
                created_at,
                updated_at,
            ) = row?;
            out.push(Op::PutSemanticChunk(SemanticChunk {
                pk: ScPk::from_raw(pk),
                edition_id: EditionId::from_raw(edition_id),
                sc_id,
                page_start,
                page_end,
                embedding_text,
                embedding_summary,
                paraphrase,
                word_count,
                sentence_count,
                metadata: serde_json::from_str(&metadata)?,
                created_at: parse_time(&created_at)?,
                updated_at: parse_time(&updated_at)?,
            }));
        }
        Ok(())
    }

    fn load_semantic_members(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT sc_pk, edition_id, line_id, ord FROM semantic_chunk_members
             ORDER BY sc_pk, ord, line_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SemanticChunkMember {
                sc_pk: ScPk::from_raw(row.get(0)?),
                edition_id: EditionId::from_raw(row.get(1)?),
                line_id: row.get(2)?,
                ord: row.get(3)?,
            })
        })?;
        for member in rows {
            out.push(Op::PutSemanticMember(member?));
        }
        Ok(())
    }

    fn load_micro_units(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT id, edition_id, unit_id, page_start, page_end, summary_json,
                    character_dynamics_json, story_threads_json, metadata_json,
                    created_at, updated_at
             FROM micro_units ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<u32>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?;
        for row in rows {
            let (
                pk,
                edition_id,
                unit_id,
                page_start,
                page_end,
                summary,
                dynamics,
                threads,
                metadata,
                created_at,
                updated_at,
            ) = row?;
            out.push(Op::PutMicroUnit(MicroUnit {
                pk: MuPk::from_raw(pk),
                edition_id: EditionId::from_raw(edition_id),
                unit_id,
                page_start,
                page_end,
                summary: serde_json::from_str(&summary)?,
                character_dynamics: serde_json::from_str(&dynamics)?,
                story_threads: serde_json::from_str(&threads)?,
                metadata: serde_json::from_str(&metadata)?,
                created_at: parse_time(&created_at)?,
                updated_at: parse_time(&updated_at)?,
            }));
        }
        Ok(())
    }

    fn load_micro_members(conn: &Connection, out: &mut ChangeSet) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "SELECT mu_pk, edition_id, sc_id, ord FROM micro_unit_members
             ORDER BY mu_pk, ord, sc_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MicroUnitMember {
                mu_pk: MuPk::from_raw(row.get(0)?),
                edition_id: EditionId::from_raw(row.get(1)?),
                sc_id: row.get(2)?,
                ord: row.get(3)?,
            })
        })?;
        for member in rows {
            out.push(Op::PutMicroMember(member?));
        }
        Ok(())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL lets readers of the file proceed while a commit is in flight
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RecordStore for SqliteStore {
    fn commit(&self, changes: &ChangeSet) -> StorageResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for op in changes.ops() {
            Self::write_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> StorageResult<ChangeSet> {
        let conn = self.lock();
        let mut out = ChangeSet::new();
        Self::load_works(&conn, &mut out)?;
        Self::load_editions(&conn, &mut out)?;
        Self::load_chunks(&conn, &mut out)?;
        Self::load_semantic_chunks(&conn, &mut out)?;
        Self::load_semantic_members(&conn, &mut out)?;
        Self::load_micro_units(&conn, &mut out)?;
        Self::load_micro_members(&conn, &mut out)?;
        Self::load_sequences(&conn, &mut out)?;
        Ok(out)
    }
}
