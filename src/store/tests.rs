//! Engine tests: write rules, cascades and atomicity

use super::*;
use crate::derive::{content_hash, FixedClock, StepClock, SystemClock};
use crate::model::{
    CharacterDynamic, EditionId, MicroUnitMember, MicroUnitPatch, NewChunk, NewEdition,
    NewMicroUnit, NewSemanticChunk, PageSpan, SemanticChunkMember, SemanticChunkPatch,
    TextVariants, UnitSummary, WorkId,
};
use crate::storage::{RecordStore, StorageError, StorageResult};
use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration as WaitTime;

const FR77: &str = "Les gens ne se parlent plus.";

struct Fixture {
    store: Palimpsest,
    work: WorkId,
    ed: EditionId,
}

fn fixture_with(store: Palimpsest) -> Fixture {
    let work = store
        .ensure_work("Voyage au bout de la nuit", "Céline", None)
        .unwrap();
    let ed = store
        .ensure_edition(work, NewEdition::new("fr").publisher("Gallimard").year(1986))
        .unwrap();
    let lines = [
        ("FR77", 12, 3, FR77),
        ("FR78", 12, 4, "Ils ont peur."),
        ("FR79", 13, 1, "La nuit tombe."),
    ];
    for (line_id, page, line_no, text) in lines {
        store
            .insert_chunk(ed, NewChunk::new(line_id, page, line_no, [0.0, 0.0, 10.0, 10.0], text))
            .unwrap();
    }
    Fixture { store, work, ed }
}

fn fixture() -> Fixture {
    fixture_with(Palimpsest::new())
}

// === Works & editions ===

#[test]
fn ensure_work_and_edition_are_idempotent() {
    let f = fixture();
    let again = f
        .store
        .ensure_work("Voyage au bout de la nuit", "Céline", Some("ignored"))
        .unwrap();
    assert_eq!(again, f.work);
    assert!(f.store.snapshot().work(f.work).unwrap().notes.is_none());

    // Language is normalized before the identity lookup
    let ed = f
        .store
        .ensure_edition(f.work, NewEdition::new("FR").publisher("Gallimard").year(1986))
        .unwrap();
    assert_eq!(ed, f.ed);
    assert_eq!(f.store.snapshot().stats().editions, 1);

    // A different archive id is a different edition
    let other = f
        .store
        .ensure_edition(f.work, NewEdition::new("fr").publisher("Gallimard").source_archive_id("BnF-1"))
        .unwrap();
    assert_ne!(other, f.ed);
}

#[test]
fn edition_input_is_validated() {
    let f = fixture();
    for bad in [NewEdition::new("fra"), NewEdition::new("fr").year(1200)] {
        assert!(matches!(
            f.store.ensure_edition(f.work, bad),
            Err(StoreError::Validation { .. })
        ));
    }
    assert!(matches!(
        f.store.ensure_edition(WorkId::from_raw(99), NewEdition::new("de")),
        Err(StoreError::ReferentialIntegrity { .. })
    ));
}

#[test]
fn delete_work_is_refused_while_editions_exist() {
    let f = fixture();
    assert!(matches!(
        f.store.delete_work(f.work),
        Err(StoreError::ReferentialIntegrity { .. })
    ));
    f.store.delete_edition(f.ed).unwrap();
    f.store.delete_work(f.work).unwrap();
    assert!(f.store.snapshot().work(f.work).unwrap_err().is_not_found());
}

#[test]
fn notes_can_be_updated() {
    let f = fixture();
    f.store
        .update_edition_notes(f.ed, Some("pocket edition".into()))
        .unwrap();
    f.store.update_work_notes(f.work, Some("1932".into())).unwrap();
    let snap = f.store.snapshot();
    assert_eq!(snap.edition(f.ed).unwrap().notes.as_deref(), Some("pocket edition"));
    assert_eq!(snap.work(f.work).unwrap().notes.as_deref(), Some("1932"));
}

// === Chunks ===

#[test]
fn chunk_gets_hash_and_positional_lookup() {
    let f = fixture();
    let snap = f.store.snapshot();
    let chunk = snap.chunk_at(f.ed, 12, 3).unwrap();
    assert_eq!(chunk.line_id, "FR77");
    assert_eq!(chunk.content_hash, content_hash(FR77));
    assert_eq!(snap.chunk_by_line(f.ed, "FR77").unwrap().id, chunk.id);
}

#[test]
fn chunk_uniqueness_is_per_position_and_line_id() {
    let f = fixture();
    let same_position = NewChunk::new("FR99", 12, 3, [0.0, 0.0, 1.0, 1.0], "x");
    let same_line = NewChunk::new("FR77", 40, 1, [0.0, 0.0, 1.0, 1.0], "x");
    for dup in [same_position, same_line] {
        assert!(matches!(
            f.store.insert_chunk(f.ed, dup),
            Err(StoreError::Uniqueness { .. })
        ));
    }
    assert_eq!(f.store.snapshot().stats().chunks, 3);
}

#[test]
fn chunk_input_is_validated() {
    let f = fixture();
    let bad = [
        NewChunk::new("A", 0, 1, [0.0, 0.0, 1.0, 1.0], "x"),
        NewChunk::new("A", 1, 0, [0.0, 0.0, 1.0, 1.0], "x"),
        NewChunk::new("A", 1, 9, [0.0, 0.0, 1.0], "x"),
        NewChunk::new("A", 1, 9, [0.0, f64::NAN, 1.0, 1.0], "x"),
        NewChunk::new("", 1, 9, [0.0, 0.0, 1.0, 1.0], "x"),
    ];
    for chunk in bad {
        assert!(matches!(
            f.store.insert_chunk(f.ed, chunk),
            Err(StoreError::Validation { .. })
        ));
    }
}

// === Semantic chunks ===

#[test]
fn assemble_semantic_chunk_orders_members() {
    let f = fixture();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR79", "FR77"])
        .unwrap();
    let snap = f.store.snapshot();
    let summary = snap.semantic_chunk_summary(sc).unwrap();
    assert_eq!(summary.line_ids, vec!["FR79", "FR77"]);
    assert_eq!(summary.member_count, 2);
    assert_eq!(
        snap.semantic_full_text(sc).unwrap(),
        format!("La nuit tombe. {FR77}")
    );
}

#[test]
fn assemble_with_missing_line_writes_nothing() {
    let f = fixture();
    let err = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "NOPE"])
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity { .. }));
    let snap = f.store.snapshot();
    assert!(snap.semantic_chunk_by_id(f.ed, "SC_001").unwrap_err().is_not_found());
    assert_eq!(snap.stats().semantic_chunk_members, 0);
}

#[test]
fn assemble_rejects_repeated_line() {
    let f = fixture();
    let err = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR77"])
        .unwrap_err();
    assert!(matches!(err, StoreError::Uniqueness { .. }));
}

#[test]
fn semantic_ids_are_unique_per_edition() {
    let f = fixture();
    f.store
        .create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"))
        .unwrap();
    assert!(matches!(
        f.store.create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001")),
        Err(StoreError::Uniqueness { .. })
    ));
    assert!(matches!(
        f.store.create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_002").pages(5, 4)),
        Err(StoreError::Validation { .. })
    ));
}

#[test]
fn member_with_foreign_edition_is_a_consistency_violation() {
    let f = fixture();
    let other = f
        .store
        .ensure_edition(f.work, NewEdition::new("en").publisher("New Directions"))
        .unwrap();
    f.store
        .insert_chunk(other, NewChunk::new("EN1", 1, 1, [0.0, 0.0, 1.0, 1.0], "People don't talk."))
        .unwrap();
    let sc = f
        .store
        .create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"))
        .unwrap();

    let err = f
        .store
        .add_semantic_member(SemanticChunkMember {
            sc_pk: sc,
            edition_id: other,
            line_id: "EN1".into(),
            ord: 1,
        })
        .unwrap_err();
    match err {
        StoreError::Consistency { got, expected, .. } => {
            assert_eq!(got, other);
            assert_eq!(expected, f.ed);
        }
        other => panic!("expected consistency violation, got {other:?}"),
    }
    assert!(f.store.snapshot().semantic_members(sc).unwrap().is_empty());
}

#[test]
fn member_ord_changes_reorder_full_text() {
    let f = fixture();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR78"])
        .unwrap();
    f.store
        .update_semantic_member(SemanticChunkMember {
            sc_pk: sc,
            edition_id: f.ed,
            line_id: "FR77".into(),
            ord: 3,
        })
        .unwrap();
    assert_eq!(
        f.store.snapshot().semantic_full_text(sc).unwrap(),
        format!("Ils ont peur. {FR77}")
    );

    assert!(f
        .store
        .update_semantic_member(SemanticChunkMember {
            sc_pk: sc,
            edition_id: f.ed,
            line_id: "FR79".into(),
            ord: 1,
        })
        .unwrap_err()
        .is_not_found());
    assert!(matches!(
        f.store.add_semantic_member(SemanticChunkMember {
            sc_pk: sc,
            edition_id: f.ed,
            line_id: "FR78".into(),
            ord: 9,
        }),
        Err(StoreError::Uniqueness { .. })
    ));
}

#[test]
fn member_update_cannot_move_row_to_another_edition() {
    let f = fixture();
    let other = f.store.ensure_edition(f.work, NewEdition::new("en")).unwrap();
    f.store
        .insert_chunk(other, NewChunk::new("FR77", 1, 1, [0.0, 0.0, 1.0, 1.0], "People don't talk."))
        .unwrap();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR78"])
        .unwrap();

    let err = f
        .store
        .update_semantic_member(SemanticChunkMember {
            sc_pk: sc,
            edition_id: other,
            line_id: "FR77".into(),
            ord: 5,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Consistency { parent: "semantic chunk", .. }));

    let snap = f.store.snapshot();
    let members = snap.semantic_members(sc).unwrap();
    assert_eq!((members[0].line_id.as_str(), members[0].ord), ("FR77", 1));
    assert_eq!(members[0].edition_id, f.ed);
    assert_eq!(snap.semantic_full_text(sc).unwrap(), format!("{FR77} Ils ont peur."));
}

#[test]
fn delete_semantic_member_keeps_the_chunk() {
    let f = fixture();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR78"])
        .unwrap();
    f.store.delete_semantic_member(sc, "FR77").unwrap();

    let snap = f.store.snapshot();
    assert_eq!(snap.semantic_full_text(sc).unwrap(), "Ils ont peur.");
    assert!(snap.chunk_by_line(f.ed, "FR77").is_ok());
    drop(snap);

    // The last member can go too; the chunk stays, empty
    f.store.delete_semantic_member(sc, "FR78").unwrap();
    let snap = f.store.snapshot();
    assert!(snap.semantic_members(sc).unwrap().is_empty());
    assert_eq!(snap.semantic_chunk(sc).unwrap().sc_id, "SC_001");
    assert!(snap.verify_integrity().is_empty());
    assert!(f.store.delete_semantic_member(sc, "FR78").unwrap_err().is_not_found());
}

#[test]
fn update_bumps_updated_at_only() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(StepClock::new(start, Duration::minutes(1)));
    let f = fixture_with(Palimpsest::with_clock(clock));
    let sc = f
        .store
        .create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"))
        .unwrap();
    f.store
        .update_semantic_chunk(
            sc,
            SemanticChunkPatch {
                text: Some(TextVariants {
                    paraphrase: Some("Nobody talks anymore.".into()),
                    ..Default::default()
                }),
                pages: Some(PageSpan::new(Some(12), Some(12))),
                ..Default::default()
            },
        )
        .unwrap();

    let snap = f.store.snapshot();
    let stored = snap.semantic_chunk(sc).unwrap();
    assert_eq!(stored.created_at, start);
    assert_eq!(stored.updated_at, start + Duration::minutes(1));
    assert_eq!(stored.paraphrase.as_deref(), Some("Nobody talks anymore."));
    assert_eq!(stored.page_start, Some(12));
}

#[test]
fn empty_patch_does_not_touch() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(StepClock::new(start, Duration::minutes(1)));
    let f = fixture_with(Palimpsest::with_clock(clock));
    let sc = f
        .store
        .create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"))
        .unwrap();
    let mu = f
        .store
        .create_micro_unit(f.ed, NewMicroUnit::new("MU_001"))
        .unwrap();

    f.store.update_semantic_chunk(sc, SemanticChunkPatch::default()).unwrap();
    f.store.update_micro_unit(mu, MicroUnitPatch::default()).unwrap();
    let snap = f.store.snapshot();
    assert_eq!(snap.semantic_chunk(sc).unwrap().updated_at, start);
    assert_eq!(snap.micro_unit(mu).unwrap().updated_at, start + Duration::minutes(1));
    drop(snap);

    // Existence is still checked
    assert!(f
        .store
        .update_micro_unit(crate::model::MuPk::from_raw(42), MicroUnitPatch::default())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn rejected_update_leaves_record_untouched() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let f = fixture_with(Palimpsest::with_clock(Arc::new(FixedClock(at))));
    let sc = f
        .store
        .create_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001").pages(1, 2))
        .unwrap();
    let err = f
        .store
        .update_semantic_chunk(
            sc,
            SemanticChunkPatch {
                pages: Some(PageSpan::new(Some(9), Some(2))),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));
    assert_eq!(
        f.store.snapshot().semantic_chunk(sc).unwrap().pages(),
        PageSpan::new(Some(1), Some(2))
    );
}

// === Micro-units ===

fn with_unit(f: &Fixture) -> crate::model::MuPk {
    f.store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR78"])
        .unwrap();
    f.store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_002"), &["FR79"])
        .unwrap();
    let summary = UnitSummary {
        narrative_function: Some("exposition".into()),
        ..Default::default()
    };
    f.store
        .assemble_micro_unit(
            f.ed,
            NewMicroUnit::new("MU_001")
                .pages(12, 13)
                .summary(summary)
                .dynamic(CharacterDynamic::new("Bardamu", "Arthur").relation("friend"))
                .thread("silence")
                .thread("night")
                .thread("silence"),
            &["SC_001", "SC_002"],
        )
        .unwrap()
}

#[test]
fn micro_unit_is_indexed_by_tags() {
    let f = fixture();
    let mu = with_unit(&f);
    let snap = f.store.snapshot();
    let unit = snap.micro_unit(mu).unwrap();
    assert_eq!(
        unit.story_threads.iter().collect::<Vec<_>>(),
        vec!["night", "silence"]
    );
    assert_eq!(snap.units_with_thread("silence")[0].pk, mu);
    assert_eq!(snap.units_with_participant("Arthur")[0].pk, mu);
    assert_eq!(snap.units_with_narrative_function("exposition")[0].pk, mu);
    assert_eq!(
        snap.micro_unit_summary(mu).unwrap().semantic_chunk_ids,
        vec!["SC_001", "SC_002"]
    );
}

#[test]
fn summary_rows_carry_open_summary_keys() {
    let Fixture { store, ed, .. } = fixture();
    let mut summary: UnitSummary = serde_json::from_value(serde_json::json!({
        "what_happens": "Bardamu enlists",
        "tone": "ironic",
        "unit_id": "shadowed"
    }))
    .unwrap();
    summary.significance = Some("opens the war".into());
    store
        .create_micro_unit(ed, NewMicroUnit::new("MU_001").summary(summary))
        .unwrap();

    let mu = store.snapshot().micro_unit_by_id(ed, "MU_001").unwrap().pk;
    let row = store.snapshot().micro_unit_summary(mu).unwrap();
    assert_eq!(row.extra.get("tone"), Some(&serde_json::json!("ironic")));
    assert!(!row.extra.contains_key("unit_id"));
    assert_eq!(row.significance.as_deref(), Some("opens the war"));

    let surface = crate::query::QuerySurface::new(Arc::new(store));
    let response = surface
        .execute(&crate::query::QueryRequest::MicroUnitSummary {
            edition_id: ed,
            unit_id: "MU_001".into(),
        })
        .unwrap();
    assert_eq!(response.rows[0]["tone"], "ironic");
    assert_eq!(response.rows[0]["unit_id"], "MU_001");
    assert_eq!(response.rows[0]["what_happens"], "Bardamu enlists");
}

#[test]
fn micro_update_reindexes_tags() {
    let f = fixture();
    let mu = with_unit(&f);
    f.store
        .update_micro_unit(
            mu,
            MicroUnitPatch {
                story_threads: Some(vec!["war".into()]),
                character_dynamics: Some(Vec::new()),
                ..Default::default()
            },
        )
        .unwrap();
    let snap = f.store.snapshot();
    assert!(snap.units_with_thread("silence").is_empty());
    assert!(snap.units_with_participant("Arthur").is_empty());
    assert_eq!(snap.units_with_thread("war").len(), 1);
    assert_eq!(snap.threads(), vec!["war"]);
}

#[test]
fn micro_member_edition_must_match_unit() {
    let f = fixture();
    let mu = with_unit(&f);
    let other = f
        .store
        .ensure_edition(f.work, NewEdition::new("de"))
        .unwrap();
    let err = f
        .store
        .add_micro_member(MicroUnitMember {
            mu_pk: mu,
            edition_id: other,
            sc_id: "SC_003".into(),
            ord: 3,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Consistency { parent: "micro-unit", .. }));
    assert_eq!(f.store.snapshot().micro_members(mu).unwrap().len(), 2);
}

#[test]
fn micro_member_ord_update_reorders_summary() {
    let f = fixture();
    let mu = with_unit(&f);
    f.store
        .update_micro_member(MicroUnitMember {
            mu_pk: mu,
            edition_id: f.ed,
            sc_id: "SC_001".into(),
            ord: 3,
        })
        .unwrap();
    assert_eq!(
        f.store.snapshot().micro_unit_summary(mu).unwrap().semantic_chunk_ids,
        vec!["SC_002", "SC_001"]
    );

    assert!(f
        .store
        .update_micro_member(MicroUnitMember {
            mu_pk: mu,
            edition_id: f.ed,
            sc_id: "SC_404".into(),
            ord: 1,
        })
        .unwrap_err()
        .is_not_found());
}

#[test]
fn micro_member_update_with_foreign_edition_is_refused() {
    let f = fixture();
    let mu = with_unit(&f);
    let other = f.store.ensure_edition(f.work, NewEdition::new("en")).unwrap();
    f.store
        .create_semantic_chunk(other, NewSemanticChunk::new("SC_001"))
        .unwrap();

    let err = f
        .store
        .update_micro_member(MicroUnitMember {
            mu_pk: mu,
            edition_id: other,
            sc_id: "SC_001".into(),
            ord: 7,
        })
        .unwrap_err();
    match err {
        StoreError::Consistency { parent, got, expected } => {
            assert_eq!(parent, "micro-unit");
            assert_eq!((got, expected), (other, f.ed));
        }
        other => panic!("expected consistency violation, got {other:?}"),
    }

    let snap = f.store.snapshot();
    let members = snap.micro_members(mu).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!((members[0].sc_id.as_str(), members[0].ord), ("SC_001", 1));
    assert_eq!(members[0].edition_id, f.ed);
}

#[test]
fn blank_story_thread_is_rejected() {
    let f = fixture();
    let err = f
        .store
        .create_micro_unit(f.ed, NewMicroUnit::new("MU_009").thread("  "))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { field: "story_threads", .. }));
}

// === Deletes ===

#[test]
fn delete_chunk_drops_its_memberships() {
    let f = fixture();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77", "FR78"])
        .unwrap();
    let chunk = f.store.snapshot().chunk_by_line(f.ed, "FR77").unwrap().id;
    f.store.delete_chunk(chunk).unwrap();

    let snap = f.store.snapshot();
    assert_eq!(snap.semantic_chunk_summary(sc).unwrap().line_ids, vec!["FR78"]);
    assert!(snap.search_text("gens").is_empty());
    assert!(snap.verify_integrity().is_empty());
}

#[test]
fn delete_semantic_chunk_drops_micro_memberships() {
    let f = fixture();
    let mu = with_unit(&f);
    let sc = f.store.snapshot().semantic_chunk_by_id(f.ed, "SC_001").unwrap().pk;
    f.store.delete_semantic_chunk(sc).unwrap();

    let snap = f.store.snapshot();
    assert_eq!(
        snap.micro_unit_summary(mu).unwrap().semantic_chunk_ids,
        vec!["SC_002"]
    );
    assert!(snap.verify_integrity().is_empty());
}

#[test]
fn delete_micro_unit_keeps_semantic_chunks() {
    let f = fixture();
    let mu = with_unit(&f);
    f.store.delete_micro_unit(mu).unwrap();

    let snap = f.store.snapshot();
    assert!(snap.micro_unit(mu).unwrap_err().is_not_found());
    assert!(snap.micro_unit_by_id(f.ed, "MU_001").unwrap_err().is_not_found());
    assert!(snap.units_with_thread("silence").is_empty());
    assert!(snap.units_with_participant("Bardamu").is_empty());
    let stats = snap.stats();
    assert_eq!((stats.micro_units, stats.micro_unit_members), (0, 0));
    assert_eq!((stats.semantic_chunks, stats.semantic_chunk_members), (2, 3));
    assert!(snap.verify_integrity().is_empty());
    drop(snap);

    // The unit_id is free again
    f.store
        .assemble_micro_unit(f.ed, NewMicroUnit::new("MU_001"), &["SC_002"])
        .unwrap();
    assert!(f.store.delete_micro_unit(mu).unwrap_err().is_not_found());
}

#[test]
fn delete_edition_removes_whole_tree() {
    let f = fixture();
    let mu = with_unit(&f);
    f.store.delete_edition(f.ed).unwrap();

    let snap = f.store.snapshot();
    assert!(snap.micro_unit(mu).unwrap_err().is_not_found());
    assert!(snap.chunk_by_line(f.ed, "FR77").unwrap_err().is_not_found());
    assert!(snap.units_with_thread("silence").is_empty());
    let stats = snap.stats();
    assert_eq!(stats.works, 1);
    assert_eq!(
        (stats.editions, stats.chunks, stats.semantic_chunks, stats.micro_units),
        (0, 0, 0, 0)
    );
    assert_eq!((stats.semantic_chunk_members, stats.micro_unit_members), (0, 0));
    assert_eq!(stats.vocabulary, 0);
}

#[test]
fn missing_delete_targets_are_not_found() {
    let f = fixture();
    assert!(f.store.delete_edition(EditionId::from_raw(42)).unwrap_err().is_not_found());
    assert!(f
        .store
        .delete_micro_member(crate::model::MuPk::from_raw(42), "SC_001")
        .unwrap_err()
        .is_not_found());
}

// === Cross-edition views ===

#[test]
fn story_thread_spans_editions_by_start_page() {
    let f = fixture();
    let fr_unit = with_unit(&f);
    let en = f.store.ensure_edition(f.work, NewEdition::new("en")).unwrap();
    let early = f
        .store
        .create_micro_unit(en, NewMicroUnit::new("MU_010").pages(3, 4).thread("silence"))
        .unwrap();
    let unpaged = f
        .store
        .create_micro_unit(en, NewMicroUnit::new("MU_011").thread("silence"))
        .unwrap();
    f.store
        .create_micro_unit(en, NewMicroUnit::new("MU_012").pages(1, 1).thread("war"))
        .unwrap();

    let rows = f.store.snapshot().story_thread("silence");
    let order: Vec<_> = rows.iter().map(|r| (r.unit_pk, r.edition_id, r.pages.start)).collect();
    assert_eq!(
        order,
        vec![
            (early, en, Some(3)),
            (fr_unit, f.ed, Some(12)),
            (unpaged, en, None),
        ]
    );
    assert!(rows.iter().all(|r| r.tag == "silence"));
    assert!(f.store.snapshot().story_thread("peace").is_empty());
}

#[test]
fn interactions_of_lists_rows_naming_the_character() {
    let f = fixture();
    with_unit(&f);
    let en = f.store.ensure_edition(f.work, NewEdition::new("en")).unwrap();
    f.store
        .create_micro_unit(
            en,
            NewMicroUnit::new("MU_010")
                .dynamic(CharacterDynamic::new("Bardamu", "Robinson").relation("double"))
                .dynamic(CharacterDynamic::new("Lola", "Arthur")),
        )
        .unwrap();

    let snap = f.store.snapshot();
    let mut arthur: Vec<_> = snap
        .interactions_of("Arthur")
        .into_iter()
        .map(|row| (row.unit_id, row.edition_id, row.from, row.to))
        .collect();
    arthur.sort();
    assert_eq!(
        arthur,
        vec![
            ("MU_001".to_string(), f.ed, "Bardamu".to_string(), "Arthur".to_string()),
            ("MU_010".to_string(), en, "Lola".to_string(), "Arthur".to_string()),
        ]
    );

    let robinson = snap.interactions_of("Robinson");
    assert_eq!(robinson.len(), 1);
    assert_eq!(robinson[0].relation_type.as_deref(), Some("double"));
    assert_eq!(snap.interactions_of("Bardamu").len(), 2);
    assert!(snap.interactions_of("Madelon").is_empty());
}

// === Snapshots ===

#[test]
fn writer_finishes_while_snapshot_is_held() {
    let Fixture { store, ed, .. } = fixture();
    let store = Arc::new(store);
    let held = store.snapshot();

    let (done, finished) = mpsc::channel();
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let res = store.insert_chunk(ed, NewChunk::new("FR80", 13, 2, [0.0, 0.0, 1.0, 1.0], "Il pleut."));
            let _ = done.send(res);
        })
    };
    let id = finished
        .recv_timeout(WaitTime::from_secs(2))
        .expect("insert blocked by an open snapshot")
        .unwrap();
    writer.join().unwrap();

    // The held snapshot keeps its view; a fresh one sees the write
    assert_eq!(held.stats().chunks, 3);
    assert!(held.chunk(id).unwrap_err().is_not_found());
    assert_eq!(store.snapshot().chunk(id).unwrap().text, "Il pleut.");
}

#[test]
fn same_thread_can_write_while_reading() {
    let f = fixture();
    let before = f.store.snapshot();
    let sc = f
        .store
        .assemble_semantic_chunk(f.ed, NewSemanticChunk::new("SC_001"), &["FR77"])
        .unwrap();
    f.store.delete_chunk(before.chunk_by_line(f.ed, "FR79").unwrap().id).unwrap();

    assert!(before.semantic_chunk(sc).unwrap_err().is_not_found());
    assert_eq!(before.stats().chunks, 3);
    let after = f.store.snapshot();
    assert_eq!(after.stats().chunks, 2);
    assert_eq!(after.semantic_full_text(sc).unwrap(), FR77);
}

// === Atomicity against the record store ===

/// Record store whose commits fail while `broken` is set
#[derive(Default)]
struct FlakyStore {
    broken: AtomicBool,
}

impl RecordStore for FlakyStore {
    fn commit(&self, _changes: &ChangeSet) -> StorageResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }

    fn load(&self) -> StorageResult<ChangeSet> {
        Ok(ChangeSet::new())
    }
}

#[test]
fn failed_persist_leaves_memory_untouched() {
    let backend = Arc::new(FlakyStore::default());
    let store = Palimpsest::with_store(backend.clone(), Arc::new(SystemClock)).unwrap();
    let f = fixture_with(store);
    let mu = with_unit(&f);

    backend.broken.store(true, Ordering::SeqCst);
    let err = f.store.delete_edition(f.ed).unwrap_err();
    assert!(matches!(err, StoreError::Storage(StorageError::Io(_))));

    let snap = f.store.snapshot();
    assert!(snap.micro_unit(mu).is_ok());
    assert_eq!(snap.stats().chunks, 3);
    drop(snap);

    // Sequences were not consumed by the failed write either
    backend.broken.store(false, Ordering::SeqCst);
    let next = f
        .store
        .insert_chunk(f.ed, NewChunk::new("FR80", 13, 2, [0.0, 0.0, 1.0, 1.0], "x"))
        .unwrap();
    assert_eq!(next.get(), 4);
}
