//! Semantic chunks: coherent groups of OCR lines

use super::ids::{EditionId, ScPk};
use super::{Metadata, PageSpan};
use crate::derive::Timestamped;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text renditions produced for a semantic chunk by the embedding pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextVariants {
    pub embedding_text: Option<String>,
    pub embedding_summary: Option<String>,
    pub paraphrase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub pk: ScPk,
    pub edition_id: EditionId,
    pub sc_id: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub embedding_text: Option<String>,
    pub embedding_summary: Option<String>,
    pub paraphrase: Option<String>,
    pub word_count: Option<u32>,
    pub sentence_count: Option<u32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SemanticChunk {
    pub fn pages(&self) -> PageSpan {
        PageSpan::new(self.page_start, self.page_end)
    }

    pub fn text_variants(&self) -> TextVariants {
        TextVariants {
            embedding_text: self.embedding_text.clone(),
            embedding_summary: self.embedding_summary.clone(),
            paraphrase: self.paraphrase.clone(),
        }
    }

    pub(crate) fn set_text_variants(&mut self, text: TextVariants) {
        self.embedding_text = text.embedding_text;
        self.embedding_summary = text.embedding_summary;
        self.paraphrase = text.paraphrase;
    }
}

impl Timestamped for SemanticChunk {
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Membership of a chunk line in a semantic chunk.
///
/// `edition_id` is a denormalized copy of the parent's edition and must
/// always equal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticChunkMember {
    pub sc_pk: ScPk,
    pub edition_id: EditionId,
    pub line_id: String,
    /// 1-based position within the parent
    pub ord: u32,
}

/// Input for `create_semantic_chunk` / `assemble_semantic_chunk`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSemanticChunk {
    pub sc_id: String,
    #[serde(default)]
    pub pages: PageSpan,
    #[serde(default)]
    pub text: TextVariants,
    pub word_count: Option<u32>,
    pub sentence_count: Option<u32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewSemanticChunk {
    pub fn new(sc_id: impl Into<String>) -> Self {
        Self {
            sc_id: sc_id.into(),
            ..Default::default()
        }
    }

    pub fn pages(mut self, start: u32, end: u32) -> Self {
        self.pages = PageSpan::new(Some(start), Some(end));
        self
    }

    pub fn text(mut self, text: TextVariants) -> Self {
        self.text = text;
        self
    }

    pub fn counts(mut self, words: u32, sentences: u32) -> Self {
        self.word_count = Some(words);
        self.sentence_count = Some(sentences);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Field changes for `update_semantic_chunk`; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticChunkPatch {
    pub pages: Option<PageSpan>,
    pub text: Option<TextVariants>,
    pub word_count: Option<u32>,
    pub sentence_count: Option<u32>,
    pub metadata: Option<Metadata>,
}

impl SemanticChunkPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
