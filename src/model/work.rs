//! Works and their editions

use super::ids::{EditionId, WorkId};
use serde::{Deserialize, Serialize};

/// A literary work, independent of any printing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    pub title: String,
    pub author: String,
    /// The only field that may change after creation
    pub notes: Option<String>,
}

/// One printing or translation of a [`Work`], in one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    pub id: EditionId,
    pub work_id: WorkId,
    /// Two-letter language code, lowercase
    pub language: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub source_archive_id: Option<String>,
    pub notes: Option<String>,
}

/// Identity key of an edition: `(work_id, language, publisher, source_archive_id)`
pub type EditionKey = (WorkId, String, Option<String>, Option<String>);

impl Edition {
    pub fn identity_key(&self) -> EditionKey {
        (
            self.work_id,
            self.language.clone(),
            self.publisher.clone(),
            self.source_archive_id.clone(),
        )
    }
}

/// Input for `ensure_edition`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEdition {
    pub language: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub source_archive_id: Option<String>,
    pub notes: Option<String>,
}

impl NewEdition {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn source_archive_id(mut self, id: impl Into<String>) -> Self {
        self.source_archive_id = Some(id.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
