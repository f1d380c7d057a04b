//! Micro-units: narrative groupings of semantic chunks
//!
//! Interpretive fields are open records. The keys named here are typed and
//! checked when present; anything else is carried through untouched in the
//! flattened `extra` map.

use super::ids::{EditionId, MuPk};
use super::{Metadata, PageSpan};
use crate::derive::Timestamped;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Summary of what a unit does in the narrative
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_happens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<String>,
    #[serde(flatten)]
    pub extra: Metadata,
}

/// One directed relationship between two characters within a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDynamic {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution: Option<String>,
    #[serde(flatten)]
    pub extra: Metadata,
}

impl CharacterDynamic {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type: None,
            interaction: None,
            evolution: None,
            extra: Metadata::new(),
        }
    }

    pub fn relation(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    pub fn interaction(mut self, interaction: impl Into<String>) -> Self {
        self.interaction = Some(interaction.into());
        self
    }

    pub fn evolution(mut self, evolution: impl Into<String>) -> Self {
        self.evolution = Some(evolution.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroUnit {
    pub pk: MuPk,
    pub edition_id: EditionId,
    pub unit_id: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    #[serde(default)]
    pub summary: UnitSummary,
    #[serde(default)]
    pub character_dynamics: Vec<CharacterDynamic>,
    #[serde(default)]
    pub story_threads: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MicroUnit {
    pub fn pages(&self) -> PageSpan {
        PageSpan::new(self.page_start, self.page_end)
    }

    /// Every character named as `from` or `to`, deduplicated
    pub fn participants(&self) -> BTreeSet<&str> {
        self.character_dynamics
            .iter()
            .flat_map(|d| [d.from.as_str(), d.to.as_str()])
            .collect()
    }
}

impl Timestamped for MicroUnit {
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Membership of a semantic chunk in a micro-unit, referenced by `sc_id`.
///
/// `edition_id` is a denormalized copy of the parent's edition and must
/// always equal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroUnitMember {
    pub mu_pk: MuPk,
    pub edition_id: EditionId,
    pub sc_id: String,
    /// 1-based position within the parent
    pub ord: u32,
}

/// Input for `create_micro_unit` / `assemble_micro_unit`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMicroUnit {
    pub unit_id: String,
    #[serde(default)]
    pub pages: PageSpan,
    #[serde(default)]
    pub summary: UnitSummary,
    #[serde(default)]
    pub character_dynamics: Vec<CharacterDynamic>,
    #[serde(default)]
    pub story_threads: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMicroUnit {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            ..Default::default()
        }
    }

    pub fn pages(mut self, start: u32, end: u32) -> Self {
        self.pages = PageSpan::new(Some(start), Some(end));
        self
    }

    pub fn summary(mut self, summary: UnitSummary) -> Self {
        self.summary = summary;
        self
    }

    pub fn dynamic(mut self, dynamic: CharacterDynamic) -> Self {
        self.character_dynamics.push(dynamic);
        self
    }

    pub fn thread(mut self, tag: impl Into<String>) -> Self {
        self.story_threads.push(tag.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Field changes for `update_micro_unit`; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroUnitPatch {
    pub pages: Option<PageSpan>,
    pub summary: Option<UnitSummary>,
    pub character_dynamics: Option<Vec<CharacterDynamic>>,
    pub story_threads: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

impl MicroUnitPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
