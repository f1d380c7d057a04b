//! Common test utilities for store integration tests
//!
//! Builds a small edition of "Voyage au bout de la nuit" with OCR lines,
//! semantic chunks and micro-units, and offers random line sets for
//! property-style tests.

#![allow(dead_code)]

use palimpsest::{
    CharacterDynamic, EditionId, MuPk, NewChunk, NewEdition, NewMicroUnit, NewSemanticChunk,
    Palimpsest, ScPk, UnitSummary, WorkId,
};
use rand::seq::SliceRandom;
use rand::Rng;

pub const TITLE: &str = "Voyage au bout de la nuit";
pub const AUTHOR: &str = "Céline";
pub const FR77_TEXT: &str = "Les gens ne se parlent plus.";

/// Ids of the records created by [`seed_scenario`]
pub struct Seeded {
    pub work: WorkId,
    pub edition: EditionId,
    pub sc: ScPk,
    pub mu: MuPk,
}

/// Scenarios A and C: one work, one edition, FR77 grouped into SC_001 and
/// MU_001
pub fn seed_scenario(store: &Palimpsest) -> Seeded {
    let work = store.ensure_work(TITLE, AUTHOR, None).unwrap();
    let edition = store
        .ensure_edition(work, NewEdition::new("fr").publisher("Gallimard").year(1986))
        .unwrap();
    store
        .insert_chunk(
            edition,
            NewChunk::new("FR77", 12, 3, [0.0, 0.0, 10.0, 10.0], FR77_TEXT),
        )
        .unwrap();
    let sc = store
        .assemble_semantic_chunk(edition, NewSemanticChunk::new("SC_001"), &["FR77"])
        .unwrap();
    let mu = store
        .assemble_micro_unit(
            edition,
            NewMicroUnit::new("MU_001")
                .pages(12, 12)
                .summary(UnitSummary {
                    what_happens: Some("Bardamu observes the crowd".into()),
                    narrative_function: Some("exposition".into()),
                    ..Default::default()
                })
                .dynamic(CharacterDynamic::new("Bardamu", "Arthur").interaction("café argument"))
                .thread("alienation"),
            &["SC_001"],
        )
        .unwrap();
    Seeded {
        work,
        edition,
        sc,
        mu,
    }
}

/// Insert `count` lines on page 1 of `edition`, each with distinct text.
/// Returns `(line_id, text)` pairs in line order.
pub fn insert_lines(store: &Palimpsest, edition: EditionId, count: u32) -> Vec<(String, String)> {
    (1..=count)
        .map(|n| {
            let line_id = format!("L{n:03}");
            let text = format!("line {n} word{n}");
            store
                .insert_chunk(
                    edition,
                    NewChunk::new(line_id.clone(), 1, n, [0.0, n as f64, 100.0, n as f64 + 1.0], text.clone()),
                )
                .unwrap();
            (line_id, text)
        })
        .collect()
}

/// Random non-empty subset of `lines`, in random order
pub fn random_selection<R: Rng>(rng: &mut R, lines: &[(String, String)]) -> Vec<(String, String)> {
    let take = rng.gen_range(1..=lines.len());
    let mut picked: Vec<_> = lines.choose_multiple(rng, take).cloned().collect();
    picked.shuffle(rng);
    picked
}
