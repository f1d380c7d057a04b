//! Aggregation projections
//!
//! Computed on demand from one consistent read view and never stored, so
//! they cannot go stale. Every projection is deterministic: members come out
//! in `ord` order (ties broken by member key) and flattened rows in a fixed
//! sort order.

mod types;

pub use types::{CharacterInteraction, MicroUnitSummary, StoryThreadEntry, SemanticChunkSummary};

use crate::model::{EditionId, MicroUnit, MuPk, ScPk, SemanticChunk};
use crate::store::State;
use std::cmp::Ordering;

pub(crate) fn semantic_summary(state: &State, sc: &SemanticChunk) -> SemanticChunkSummary {
    let line_ids: Vec<String> = state
        .semantic_members_of(sc.pk)
        .into_iter()
        .map(|m| m.line_id.clone())
        .collect();
    SemanticChunkSummary {
        pk: sc.pk,
        edition_id: sc.edition_id,
        sc_id: sc.sc_id.clone(),
        pages: sc.pages(),
        text: sc.text_variants(),
        word_count: sc.word_count,
        sentence_count: sc.sentence_count,
        member_count: line_ids.len(),
        line_ids,
    }
}

/// The reconstructed passage: member chunk texts in `ord` order, joined by a
/// single space. Members whose chunk is gone are skipped.
pub(crate) fn semantic_full_text(state: &State, pk: ScPk) -> String {
    state
        .semantic_members_of(pk)
        .into_iter()
        .filter_map(|m| state.chunk_by_line(m.edition_id, &m.line_id))
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Columns of a micro-unit summary row; open keys with these names are dropped
const SUMMARY_COLUMNS: [&str; 10] = [
    "pk",
    "edition_id",
    "unit_id",
    "pages",
    "what_happens",
    "narrative_function",
    "significance",
    "story_threads",
    "member_count",
    "semantic_chunk_ids",
];

pub(crate) fn micro_summary(state: &State, unit: &MicroUnit) -> MicroUnitSummary {
    let semantic_chunk_ids: Vec<String> = state
        .micro_members_of(unit.pk)
        .into_iter()
        .map(|m| m.sc_id.clone())
        .collect();
    let mut extra = unit.summary.extra.clone();
    extra.retain(|key, _| !SUMMARY_COLUMNS.contains(&key.as_str()));
    MicroUnitSummary {
        pk: unit.pk,
        edition_id: unit.edition_id,
        unit_id: unit.unit_id.clone(),
        pages: unit.pages(),
        what_happens: unit.summary.what_happens.clone(),
        narrative_function: unit.summary.narrative_function.clone(),
        significance: unit.summary.significance.clone(),
        story_threads: unit.story_threads.iter().cloned().collect(),
        member_count: semantic_chunk_ids.len(),
        semantic_chunk_ids,
        extra,
    }
}

fn units_of<'a>(state: &'a State, edition: EditionId) -> impl Iterator<Item = &'a MicroUnit> + 'a {
    state
        .micro_in_edition(edition)
        .filter_map(move |pk| state.micro_units.get(&pk))
}

/// Every character dynamic of an edition, unit by unit in `unit_id` order,
/// entries in stored order
pub(crate) fn character_interactions(state: &State, edition: EditionId) -> Vec<CharacterInteraction> {
    units_of(state, edition).flat_map(interactions_of).collect()
}

pub(crate) fn interactions_of(unit: &MicroUnit) -> impl Iterator<Item = CharacterInteraction> + '_ {
    unit.character_dynamics.iter().map(move |d| CharacterInteraction {
        unit_pk: unit.pk,
        unit_id: unit.unit_id.clone(),
        edition_id: unit.edition_id,
        pages: unit.pages(),
        from: d.from.clone(),
        to: d.to.clone(),
        relation_type: d.relation_type.clone(),
        interaction: d.interaction.clone(),
        evolution: d.evolution.clone(),
    })
}

/// Units without a start page sort after paged ones
fn by_start_page(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_entries(entries: &mut [StoryThreadEntry]) {
    entries.sort_by(|a, b| {
        a.tag
            .cmp(&b.tag)
            .then_with(|| by_start_page(a.pages.start, b.pages.start))
            .then_with(|| a.unit_id.cmp(&b.unit_id))
            .then_with(|| a.unit_pk.cmp(&b.unit_pk))
    });
}

fn entry(unit: &MicroUnit, tag: &str) -> StoryThreadEntry {
    StoryThreadEntry {
        tag: tag.to_string(),
        unit_pk: unit.pk,
        unit_id: unit.unit_id.clone(),
        edition_id: unit.edition_id,
        pages: unit.pages(),
    }
}

/// One row per `(unit, tag)` in an edition, ordered by tag then start page
pub(crate) fn story_threads(state: &State, edition: EditionId) -> Vec<StoryThreadEntry> {
    let mut entries: Vec<_> = units_of(state, edition)
        .flat_map(|unit| unit.story_threads.iter().map(move |tag| entry(unit, tag)))
        .collect();
    sort_entries(&mut entries);
    entries
}

/// Rows for a single tag across all editions, via the tag index
pub(crate) fn story_thread(state: &State, tag: &str) -> Vec<StoryThreadEntry> {
    let mut entries: Vec<_> = state
        .indexes
        .tags
        .with_thread(tag)
        .filter_map(|pk: MuPk| state.micro_units.get(&pk))
        .map(|unit| entry(unit, tag))
        .collect();
    sort_entries(&mut entries);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageSpan;

    fn row(tag: &str, unit: &str, start: Option<u32>) -> StoryThreadEntry {
        StoryThreadEntry {
            tag: tag.into(),
            unit_pk: MuPk::from_raw(1),
            unit_id: unit.into(),
            edition_id: EditionId::from_raw(1),
            pages: PageSpan::new(start, None),
        }
    }

    #[test]
    fn thread_rows_order_by_tag_then_page() {
        let mut rows = vec![
            row("war", "MU_003", Some(2)),
            row("love", "MU_009", None),
            row("love", "MU_002", Some(40)),
            row("love", "MU_001", Some(7)),
        ];
        sort_entries(&mut rows);
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.tag.as_str(), r.unit_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("love", "MU_001"),
                ("love", "MU_002"),
                ("love", "MU_009"),
                ("war", "MU_003")
            ]
        );
    }
}
